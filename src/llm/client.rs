//! `LlmClient` trait — abstraction over text-generation backends.
//!
//! The generator only ever sends two plain-text blocks (system
//! instructions, task instructions) and reads back a single plain-text
//! response. Providers implement this trait so the engine can be pointed
//! at any backend via the `[llm] provider` config field, and tests can
//! substitute scripted doubles.

use anyhow::Result;
use async_trait::async_trait;

/// Abstraction over text-generation backends.
///
/// This call is the pipeline's only network-bound suspension point.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends the system and task instruction blocks and returns the raw
    /// response text. No structure is assumed beyond "may contain a
    /// fenced code block".
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Human-readable description of the provider and model.
    ///
    /// Used in logs, e.g. `"anthropic (claude-sonnet-4-5-20250929)"`.
    fn description(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time verification that `LlmClient` is object-safe.
    #[test]
    fn test_llm_client_is_object_safe() {
        fn _assert_object_safe(_: &dyn LlmClient) {}
    }
}
