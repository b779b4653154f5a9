//! tidepool — validated, bounded execution for LLM-generated analysis
//! snippets.
//!
//! Given a task description and a set of named data values, an external
//! text-generation service produces a short rhai script. Before the
//! script touches real data it passes a static safety gate
//! ([`Validator`]), then runs inside a restricted, deadline-bounded
//! engine ([`SandboxExecutor`]); on failure the [`RetryCoordinator`]
//! feeds the failure back into a repair prompt, for a bounded number of
//! attempts, and emits exactly one [`FinalResult`].
//!
//! # Security model
//!
//! This crate is a **policy filter plus a cooperative resource bound,
//! not a hard security boundary**. There is no process isolation and no
//! syscall filtering. The execution deadline fires at the interpreter's
//! own check points: it reliably interrupts pure computation but cannot
//! preempt a call that blocks inside native code (the worker thread is
//! abandoned, not killed). Bindings are cloned into the execution scope,
//! but values made shared via `Dynamic::into_shared` remain aliased with
//! the caller. Production hardening (process-level isolation, hard
//! CPU/memory limits) belongs outside this crate.
//!
//! # Concurrency
//!
//! Pipelines share no mutable state: callers may run many requests
//! concurrently as long as each owns its context and bindings. Within a
//! pipeline, generation and execution are strictly sequential, and the
//! LLM call is the only suspension point.

pub mod config;
pub mod coordinator;
pub mod generator;
pub mod llm;
pub mod model;
pub mod sandbox;
pub mod validator;

pub use config::Config;
pub use coordinator::RetryCoordinator;
pub use generator::Generator;
pub use llm::{AnthropicClient, LlmClient};
pub use model::{
    AnalysisRequest, Bindings, ExecErrorKind, ExecutionContext, ExecutionOutcome, FailureStage,
    FinalResult, GenerationOutcome, ValidationVerdict,
};
pub use sandbox::SandboxExecutor;
pub use validator::Validator;
