//! Bounded execution of validated snippets.
//!
//! A fresh engine is built per call: pure built-ins only, the library
//! modules named in the allowlist, then the caller's bindings. Every
//! failure mode is converted into a structured [`ExecutionOutcome`] —
//! nothing raises past this boundary.
//!
//! The deadline is cooperative: it fires at the interpreter's own check
//! points, which reliably bounds pure computation but cannot preempt a
//! call that blocks inside native code. This engine is a policy filter
//! plus a resource bound, not a hard security boundary; process-level
//! isolation is out of its scope.

pub mod libraries;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rhai::module_resolvers::StaticModuleResolver;
use rhai::{Dynamic, Engine, Module, Scope, Shared};
use tracing::debug;

use crate::config::ExecutionConfig;
use crate::model::{Bindings, ExecErrorKind, ExecutionOutcome};

/// Fixed message reported for every deadline expiry.
pub const TIMEOUT_MESSAGE: &str = "execution timed out";

/// Runs snippets under a wall-clock deadline and data-size ceilings.
///
/// Stateless between calls; cheap to share behind an `Arc`.
pub struct SandboxExecutor {
    config: ExecutionConfig,
}

impl SandboxExecutor {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    /// Executes a snippet against the given bindings.
    ///
    /// Bindings are cloned into the execution scope, so plain values are
    /// isolated from the caller; values made shared via
    /// `Dynamic::into_shared` remain aliased and a snippet can mutate
    /// them — callers needing isolation must pass non-shared values.
    pub fn execute(
        &self,
        snippet: &str,
        bindings: &Bindings,
        allowed_modules: &[String],
    ) -> ExecutionOutcome {
        let captured: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
        let engine = self.build_engine(allowed_modules, captured.clone());

        // Validated snippets always compile; this guards direct callers.
        let ast = match engine.compile(snippet) {
            Ok(ast) => ast,
            Err(e) => {
                return ExecutionOutcome::failed(
                    ExecErrorKind::Runtime,
                    format!("parse error: {e}"),
                    0,
                    None,
                )
            }
        };

        let mut scope = Scope::new();
        for (name, value) in bindings {
            scope.push_dynamic(name.clone(), value.clone());
        }

        let started = Instant::now();
        let eval_result = engine.eval_ast_with_scope::<Dynamic>(&mut scope, &ast);
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut output = drain_output(&captured);

        match eval_result {
            Ok(_) => {
                // Reserved name: absent is a success with no value.
                let result = scope.get("result").cloned();
                let preview = self.render_preview(&result, &mut output);
                debug!(
                    duration_ms,
                    has_result = result.is_some(),
                    "snippet completed"
                );
                ExecutionOutcome::succeeded(result, preview, duration_ms, output)
            }
            Err(err) => {
                let outcome = match err.as_ref() {
                    rhai::EvalAltResult::ErrorTerminated(..) => ExecutionOutcome::failed(
                        ExecErrorKind::Timeout,
                        TIMEOUT_MESSAGE,
                        // Report the bound itself, not how long the
                        // interrupt took to land.
                        self.config.deadline_ms,
                        output,
                    ),
                    rhai::EvalAltResult::ErrorDataTooLarge(..) => ExecutionOutcome::failed(
                        ExecErrorKind::MemoryLimit,
                        err.to_string(),
                        duration_ms,
                        output,
                    ),
                    _ => ExecutionOutcome::failed(
                        ExecErrorKind::Runtime,
                        err.to_string(),
                        duration_ms,
                        output,
                    ),
                };
                debug!(
                    kind = %outcome.error_kind.map(|k| k.to_string()).unwrap_or_default(),
                    duration_ms = outcome.duration_ms,
                    "snippet failed"
                );
                outcome
            }
        }
    }

    fn build_engine(&self, allowed_modules: &[String], sink: Arc<Mutex<String>>) -> Engine {
        let mut engine = Engine::new();

        // The default package is pure (no file/process/network surface);
        // `eval` is the one escape hatch and is removed outright.
        engine.disable_symbol("eval");

        engine.set_max_array_size(self.config.max_array_size);
        engine.set_max_string_size(self.config.max_string_size);
        engine.set_max_map_size(self.config.max_map_size);
        engine.set_max_call_levels(64);
        engine.set_max_expr_depths(64, 32);

        // Only allowlisted libraries exist, both as importable modules and
        // globally so method-call syntax works on columns.
        let mut resolver = StaticModuleResolver::new();
        for name in allowed_modules {
            if let Some(module) = libraries::library_module(name) {
                let shared: Shared<Module> = module.into();
                resolver.insert(name.clone(), shared.as_ref().clone());
                engine.register_global_module(shared);
            }
        }
        engine.set_module_resolver(resolver);

        engine.on_print(move |text| {
            if let Ok(mut buf) = sink.lock() {
                buf.push_str(text);
                buf.push('\n');
            }
        });

        let deadline = Instant::now() + Duration::from_millis(self.config.deadline_ms);
        engine.on_progress(move |_ops| {
            if Instant::now() >= deadline {
                Some("deadline".into())
            } else {
                None
            }
        });

        engine
    }

    /// Renders `result` for reporting, clipped to the configured byte cap;
    /// truncation is flagged in the captured output, never an error.
    fn render_preview(&self, result: &Option<Dynamic>, output: &mut Option<String>) -> Option<String> {
        let value = result.as_ref()?;
        let rendered = value.to_string();
        if rendered.len() <= self.config.max_result_bytes {
            return Some(rendered);
        }
        let clipped = clip_utf8(&rendered, self.config.max_result_bytes).to_string();
        let note = format!(
            "[result preview truncated to {} bytes]",
            self.config.max_result_bytes
        );
        match output {
            Some(text) => {
                text.push('\n');
                text.push_str(&note);
            }
            None => *output = Some(note),
        }
        Some(clipped)
    }
}

fn drain_output(captured: &Arc<Mutex<String>>) -> Option<String> {
    let text = captured.lock().ok()?.clone();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn clip_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
