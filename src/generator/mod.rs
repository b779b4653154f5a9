//! Snippet generation: prompt assembly, the LLM call, extraction, and
//! immediate validation.
//!
//! `generate` and `regenerate` return `Err` only when the text-generation
//! service itself fails; a bad snippet comes back as a
//! [`GenerationOutcome`] with an invalid verdict so the coordinator can
//! decide whether to repair.

pub mod extract;
pub mod prompt;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::llm::LlmClient;
use crate::model::{AnalysisRequest, GenerationOutcome};
use crate::validator::Validator;

pub struct Generator {
    llm: Arc<dyn LlmClient>,
    validator: Validator,
}

impl Generator {
    pub fn new(llm: Arc<dyn LlmClient>, validator: Validator) -> Self {
        Self { llm, validator }
    }

    /// First attempt for a request.
    pub async fn generate(&self, request: &AnalysisRequest) -> Result<GenerationOutcome> {
        let system = prompt::render_system_block(&request.context);
        let task = prompt::render_task_block(request);
        self.invoke(request, &system, &task).await
    }

    /// Repair attempt: same system block (the environment does not change
    /// across retries), task block built from the failed snippet and its
    /// failure reason.
    pub async fn regenerate(
        &self,
        request: &AnalysisRequest,
        previous_snippet: &str,
        failure_reason: &str,
    ) -> Result<GenerationOutcome> {
        let system = prompt::render_system_block(&request.context);
        let task = prompt::render_repair_block(request, previous_snippet, failure_reason);
        self.invoke(request, &system, &task).await
    }

    async fn invoke(
        &self,
        request: &AnalysisRequest,
        system: &str,
        task: &str,
    ) -> Result<GenerationOutcome> {
        debug!(request_id = %request.id, llm = %self.llm.description(), "requesting snippet");

        let response = self.llm.complete(system, task).await?;
        let snippet = extract::extract_snippet(&response);
        let verdict = self.validator.validate(&snippet);

        info!(
            request_id = %request.id,
            valid = verdict.is_valid,
            errors = verdict.errors.len(),
            warnings = verdict.warnings.len(),
            snippet_bytes = snippet.len(),
            "snippet generated"
        );

        Ok(GenerationOutcome { snippet, verdict })
    }
}
