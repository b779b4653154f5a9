//! Shared data model for the generate → validate → execute → repair pipeline.
//!
//! These are plain records passed between the generator, validator, sandbox
//! executor and retry coordinator. Failures travel as typed fields inside
//! these records, never as panics or `Err` values escaping a component.

use std::collections::HashMap;

use rhai::Dynamic;
use uuid::Uuid;

/// Named in-memory values made available to a snippet at execution time.
///
/// Keys must match the variable names advertised in the
/// [`ExecutionContext`]. Values are cloned into the execution scope per
/// attempt; plain values deep-clone, but values made shared via
/// `Dynamic::into_shared` remain aliased with the caller — pass non-shared
/// values when isolation matters.
pub type Bindings = HashMap<String, Dynamic>;

/// Everything a snippet is allowed to see, described for prompting.
///
/// Built once per request by the data-loading collaborator and owned by the
/// caller. The `sample_preview` is prompt material only; it is never handed
/// to the executor.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Variable name → human-readable description.
    pub variables: HashMap<String, String>,
    /// Library modules the snippet may import, in advertisement order.
    pub allowed_modules: Vec<String>,
    /// Compact sample of the data, for prompting only.
    pub sample_preview: Option<serde_json::Value>,
}

/// One analysis task to run against a set of named values.
///
/// Immutable once created.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub id: Uuid,
    /// Natural-language description of the computation.
    pub task: String,
    /// What shape/meaning the `result` value should have.
    pub expected_output: String,
    pub context: ExecutionContext,
    pub hint: Option<String>,
    /// Ordered constraint strings, rendered verbatim into the prompt.
    pub constraints: Vec<String>,
}

impl AnalysisRequest {
    pub fn new(task: impl Into<String>, expected_output: impl Into<String>, context: ExecutionContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            expected_output: expected_output.into(),
            context,
            hint: None,
            constraints: Vec::new(),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }
}

/// Outcome of static validation. Warnings never affect validity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationVerdict {
    /// Builds a verdict; validity is derived from the error list, so the
    /// `is_valid ⇔ errors.is_empty()` invariant cannot be broken.
    pub fn new(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// All errors joined into one line, for repair prompts and logs.
    pub fn joined_errors(&self) -> String {
        self.errors.join("; ")
    }
}

/// One generation attempt: the extracted snippet plus its verdict.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub snippet: String,
    pub verdict: ValidationVerdict,
}

/// Classification of a failed execution, used to word the repair prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecErrorKind {
    /// The wall-clock deadline elapsed before the snippet finished.
    Timeout,
    /// The snippet raised an error while running.
    Runtime,
    /// The snippet hit a data-size ceiling.
    MemoryLimit,
}

impl std::fmt::Display for ExecErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecErrorKind::Timeout => write!(f, "timeout"),
            ExecErrorKind::Runtime => write!(f, "runtime error"),
            ExecErrorKind::MemoryLimit => write!(f, "memory limit"),
        }
    }
}

/// Structured outcome of one sandboxed execution.
///
/// Exactly one of `result` / `error` is present on success / failure, with
/// one exception: a snippet that ran to completion without ever binding
/// `result` is still a success with `result = None` (a warning condition
/// upstream, never an error).
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub success: bool,
    /// The value bound to `result`, opaque to this engine.
    pub result: Option<Dynamic>,
    /// Textual rendering of `result`, clipped to the configured byte cap.
    pub result_preview: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<ExecErrorKind>,
    pub duration_ms: u64,
    /// Text the snippet printed, plus any truncation notes.
    pub output: Option<String>,
}

impl ExecutionOutcome {
    pub fn succeeded(result: Option<Dynamic>, result_preview: Option<String>, duration_ms: u64, output: Option<String>) -> Self {
        Self {
            success: true,
            result,
            result_preview,
            error: None,
            error_kind: None,
            duration_ms,
            output,
        }
    }

    pub fn failed(kind: ExecErrorKind, error: impl Into<String>, duration_ms: u64, output: Option<String>) -> Self {
        Self {
            success: false,
            result: None,
            result_preview: None,
            error: Some(error.into()),
            error_kind: Some(kind),
            duration_ms,
            output,
        }
    }
}

/// Which pipeline stage a request died in, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// The text-generation service itself failed (transport error).
    Generation,
    /// The last attempt never passed static validation.
    Validation,
    /// The last attempt validated but failed in the sandbox.
    Execution,
    /// The request succeeded.
    None,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureStage::Generation => write!(f, "generation"),
            FailureStage::Validation => write!(f, "validation"),
            FailureStage::Execution => write!(f, "execution"),
            FailureStage::None => write!(f, "none"),
        }
    }
}

/// Terminal record of one pipeline run. Produced exactly once per
/// invocation; immutable afterwards.
#[derive(Debug, Clone)]
pub struct FinalResult {
    pub request_id: Uuid,
    /// The last snippet generated, if generation produced one at all.
    pub snippet: Option<String>,
    /// The last verdict, if generation produced one at all.
    pub verdict: Option<ValidationVerdict>,
    /// The terminal execution outcome, if execution ever ran.
    pub execution: Option<ExecutionOutcome>,
    pub failure_stage: FailureStage,
    /// Attempts consumed; at most `max_retries + 1`.
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl FinalResult {
    /// True iff the pipeline produced a successful execution.
    pub fn is_success(&self) -> bool {
        self.failure_stage == FailureStage::None
    }

    /// Last human-readable failure description, if any.
    pub fn failure_message(&self) -> Option<String> {
        match self.failure_stage {
            FailureStage::None => None,
            FailureStage::Execution => self.execution.as_ref().and_then(|e| e.error.clone()),
            FailureStage::Validation => self.verdict.as_ref().map(|v| v.joined_errors()),
            FailureStage::Generation => Some("text-generation service unavailable".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_validity_derived_from_errors() {
        let v = ValidationVerdict::new(vec![], vec!["w".into()]);
        assert!(v.is_valid);
        let v = ValidationVerdict::new(vec!["e".into()], vec![]);
        assert!(!v.is_valid);
    }

    #[test]
    fn test_verdict_joined_errors() {
        let v = ValidationVerdict::new(vec!["a".into(), "b".into()], vec![]);
        assert_eq!(v.joined_errors(), "a; b");
    }

    #[test]
    fn test_failed_outcome_carries_exactly_one_kind() {
        let o = ExecutionOutcome::failed(ExecErrorKind::Runtime, "boom", 3, None);
        assert!(!o.success);
        assert_eq!(o.error_kind, Some(ExecErrorKind::Runtime));
        assert!(o.result.is_none());
        assert_eq!(o.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_success_without_result_is_legal() {
        let o = ExecutionOutcome::succeeded(None, None, 1, None);
        assert!(o.success);
        assert!(o.result.is_none());
        assert!(o.error.is_none());
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ExecErrorKind::Timeout.to_string(), "timeout");
        assert_eq!(ExecErrorKind::Runtime.to_string(), "runtime error");
        assert_eq!(ExecErrorKind::MemoryLimit.to_string(), "memory limit");
    }

    #[test]
    fn test_final_result_failure_message_per_stage() {
        let base = FinalResult {
            request_id: Uuid::new_v4(),
            snippet: Some("let result = 1;".into()),
            verdict: Some(ValidationVerdict::new(vec!["bad import".into()], vec![])),
            execution: Some(ExecutionOutcome::failed(ExecErrorKind::Timeout, "execution timed out", 100, None)),
            failure_stage: FailureStage::Validation,
            attempts: 2,
            elapsed_ms: 150,
        };
        assert_eq!(base.failure_message().as_deref(), Some("bad import"));

        let exec_fail = FinalResult {
            failure_stage: FailureStage::Execution,
            ..base.clone()
        };
        assert_eq!(exec_fail.failure_message().as_deref(), Some("execution timed out"));

        let ok = FinalResult {
            failure_stage: FailureStage::None,
            ..base
        };
        assert!(ok.is_success());
        assert!(ok.failure_message().is_none());
    }
}
