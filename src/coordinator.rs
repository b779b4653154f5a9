//! Bounded generate → validate → execute → repair loop.
//!
//! The coordinator owns the pipeline's control flow: it asks the
//! generator for a snippet, inspects the verdict, hands valid snippets to
//! the sandbox executor, and feeds failures back into repair attempts.
//! It is the only component allowed to give up, and it does so solely by
//! attempt-count exhaustion — never by inspecting failure content.
//!
//! Within one pipeline, generation and execution are strictly sequential;
//! callers may run many coordinators concurrently as long as each owns
//! its request and bindings.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::config::{Config, RetryConfig};
use crate::generator::Generator;
use crate::llm::LlmClient;
use crate::model::{
    AnalysisRequest, Bindings, ExecErrorKind, ExecutionOutcome, FailureStage, FinalResult,
    GenerationOutcome,
};
use crate::sandbox::SandboxExecutor;
use crate::validator::Validator;

pub struct RetryCoordinator {
    generator: Generator,
    executor: Arc<SandboxExecutor>,
    max_retries: u32,
}

impl RetryCoordinator {
    pub fn new(generator: Generator, executor: SandboxExecutor, retry: &RetryConfig) -> Self {
        Self {
            generator,
            executor: Arc::new(executor),
            max_retries: retry.max_retries,
        }
    }

    /// Wires up the full pipeline from a config and an LLM backend.
    pub fn from_config(config: &Config, llm: Arc<dyn LlmClient>) -> anyhow::Result<Self> {
        let validator = Validator::new(&config.validation)?;
        let generator = Generator::new(llm, validator);
        let executor = SandboxExecutor::new(config.execution.clone());
        Ok(Self::new(generator, executor, &config.retry))
    }

    /// Runs one request to completion and returns the single terminal
    /// record. Never panics and never returns `Err`: every failure mode
    /// lands in the [`FinalResult`].
    pub async fn run(&self, request: &AnalysisRequest, bindings: &Bindings) -> FinalResult {
        let started = Instant::now();
        let max_attempts = self.max_retries + 1;

        let mut attempts: u32 = 0;
        let mut last_generation: Option<GenerationOutcome> = None;
        let mut last_execution: Option<ExecutionOutcome> = None;
        let mut failure_stage = FailureStage::Generation;
        let mut failure_reason = String::new();

        while attempts < max_attempts {
            attempts += 1;

            // Repair only once there is a snippet to repair; a transport
            // failure on the first attempt restarts from scratch.
            let generated = match &last_generation {
                Some(previous) if !failure_reason.is_empty() => {
                    self.generator
                        .regenerate(request, &previous.snippet, &failure_reason)
                        .await
                }
                _ => self.generator.generate(request).await,
            };

            let outcome = match generated {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(request_id = %request.id, attempt = attempts, "generation failed: {e}");
                    failure_stage = FailureStage::Generation;
                    failure_reason = e.to_string();
                    continue;
                }
            };

            if !outcome.verdict.is_valid {
                info!(
                    request_id = %request.id,
                    attempt = attempts,
                    "snippet rejected by validator: {}",
                    outcome.verdict.joined_errors()
                );
                failure_stage = FailureStage::Validation;
                failure_reason = outcome.verdict.joined_errors();
                last_generation = Some(outcome);
                continue;
            }

            // Invalid snippets never reach this point.
            let execution = self.execute(request, &outcome.snippet, bindings).await;
            last_generation = Some(outcome);

            if execution.success {
                // A missing `result` is a warning upstream, not a retry.
                last_execution = Some(execution);
                failure_stage = FailureStage::None;
                break;
            }

            failure_stage = FailureStage::Execution;
            failure_reason = execution.error.clone().unwrap_or_default();
            warn!(
                request_id = %request.id,
                attempt = attempts,
                kind = %execution.error_kind.map(|k| k.to_string()).unwrap_or_default(),
                "execution failed: {failure_reason}"
            );
            last_execution = Some(execution);
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            request_id = %request.id,
            attempts,
            elapsed_ms,
            stage = %failure_stage,
            "pipeline finished"
        );

        FinalResult {
            request_id: request.id,
            snippet: last_generation.as_ref().map(|g| g.snippet.clone()),
            verdict: last_generation.map(|g| g.verdict),
            execution: last_execution,
            failure_stage,
            attempts,
            elapsed_ms,
        }
    }

    /// The executor is synchronous and CPU-bound, so it runs on a
    /// blocking thread. On timeout that thread is abandoned, not killed —
    /// the cooperative deadline cannot preempt blocking native calls.
    async fn execute(
        &self,
        request: &AnalysisRequest,
        snippet: &str,
        bindings: &Bindings,
    ) -> ExecutionOutcome {
        let executor = self.executor.clone();
        let snippet = snippet.to_string();
        let bindings = bindings.clone();
        let modules = request.context.allowed_modules.clone();

        match tokio::task::spawn_blocking(move || executor.execute(&snippet, &bindings, &modules))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => ExecutionOutcome::failed(
                ExecErrorKind::Runtime,
                format!("execution task failed: {e}"),
                0,
                None,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutionConfig, ValidationConfig};
    use crate::model::ExecutionContext;
    use anyhow::Result;
    use async_trait::async_trait;
    use rhai::{Array, Dynamic, FLOAT};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().rev().map(String::from).collect()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _system: &str, _task: &str) -> Result<String> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow::anyhow!("llm unavailable"))
        }

        fn description(&self) -> String {
            "scripted".to_string()
        }
    }

    fn coordinator(responses: Vec<&str>, max_retries: u32) -> RetryCoordinator {
        let llm = Arc::new(ScriptedLlm::new(responses));
        let validator = Validator::new(&ValidationConfig::default()).unwrap();
        let generator = Generator::new(llm, validator);
        let executor = SandboxExecutor::new(ExecutionConfig {
            deadline_ms: 500,
            ..ExecutionConfig::default()
        });
        RetryCoordinator::new(generator, executor, &RetryConfig { max_retries })
    }

    fn request() -> AnalysisRequest {
        let mut variables = HashMap::new();
        variables.insert("x".to_string(), "numeric column".to_string());
        AnalysisRequest::new(
            "mean of x",
            "a number",
            ExecutionContext {
                variables,
                allowed_modules: vec!["stats".to_string()],
                sample_preview: None,
            },
        )
    }

    fn bindings() -> Bindings {
        let arr: Array = [90.0 as FLOAT; 5].iter().map(|v| Dynamic::from(*v)).collect();
        let mut b = Bindings::new();
        b.insert("x".to_string(), Dynamic::from(arr));
        b
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let c = coordinator(vec!["```rhai\nlet result = x.mean();\n```"], 2);
        let result = c.run(&request(), &bindings()).await;
        assert!(result.is_success());
        assert_eq!(result.attempts, 1);
        assert_eq!(result.failure_stage, FailureStage::None);
        let value = result.execution.unwrap().result.unwrap().try_cast::<FLOAT>().unwrap();
        assert!((value - 90.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_invalid_then_repaired() {
        let c = coordinator(
            vec![
                "```rhai\neval(\"1\");\n```",
                "```rhai\nlet result = x.mean();\n```",
            ],
            2,
        );
        let result = c.run(&request(), &bindings()).await;
        assert!(result.is_success());
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn test_always_invalid_exhausts_budget() {
        let c = coordinator(
            vec![
                "```rhai\neval(\"1\");\n```",
                "```rhai\neval(\"2\");\n```",
                "```rhai\neval(\"3\");\n```",
            ],
            2,
        );
        let result = c.run(&request(), &bindings()).await;
        assert!(!result.is_success());
        assert_eq!(result.failure_stage, FailureStage::Validation);
        assert_eq!(result.attempts, 3); // max_retries + 1
        // Invalid snippets never reached the executor
        assert!(result.execution.is_none());
        assert!(result.failure_message().unwrap().contains("dynamic code evaluation"));
    }

    #[tokio::test]
    async fn test_execution_failure_then_repair() {
        let c = coordinator(
            vec![
                "```rhai\nlet result = 1 / 0;\n```",
                "```rhai\nlet result = x.mean();\n```",
            ],
            2,
        );
        let result = c.run(&request(), &bindings()).await;
        assert!(result.is_success());
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn test_execution_failure_exhausts_budget() {
        let c = coordinator(
            vec![
                "```rhai\nlet result = 1 / 0;\n```",
                "```rhai\nlet result = 2 / 0;\n```",
            ],
            1,
        );
        let result = c.run(&request(), &bindings()).await;
        assert_eq!(result.failure_stage, FailureStage::Execution);
        assert_eq!(result.attempts, 2);
        let execution = result.execution.unwrap();
        assert_eq!(execution.error_kind, Some(ExecErrorKind::Runtime));
    }

    #[tokio::test]
    async fn test_missing_result_is_success_not_retry() {
        let c = coordinator(
            vec![
                "```rhai\nlet unused = x.mean();\n```",
                "```rhai\nlet result = x.mean();\n```",
            ],
            2,
        );
        let result = c.run(&request(), &bindings()).await;
        assert!(result.is_success());
        // The warning did not trigger a retry
        assert_eq!(result.attempts, 1);
        assert!(result.execution.unwrap().result.is_none());
        assert_eq!(result.verdict.unwrap().warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_reports_generation_stage() {
        let c = coordinator(vec![], 1);
        let result = c.run(&request(), &bindings()).await;
        assert!(!result.is_success());
        assert_eq!(result.failure_stage, FailureStage::Generation);
        assert_eq!(result.attempts, 2);
        assert!(result.snippet.is_none());
    }

    #[tokio::test]
    async fn test_timeout_is_reported_with_deadline_duration() {
        let c = coordinator(vec!["```rhai\nlet n = 0;\nloop { n += 1; }\n```"], 0);
        let result = c.run(&request(), &bindings()).await;
        assert_eq!(result.failure_stage, FailureStage::Execution);
        let execution = result.execution.unwrap();
        assert_eq!(execution.error_kind, Some(ExecErrorKind::Timeout));
        assert_eq!(execution.duration_ms, 500);
    }
}
