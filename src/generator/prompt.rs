//! Prompt assembly for snippet generation.
//!
//! Two plain-text blocks per call: a system block describing the execution
//! environment (variables, allowed modules, rules, optional data preview)
//! and a task block describing what to compute. Repair calls swap the task
//! block for one carrying the failed snippet and its failure reason; the
//! system block is rebuilt from the same request and therefore stable
//! across a retry sequence.

use crate::model::{AnalysisRequest, ExecutionContext};

/// Renders the environment description and rule set.
///
/// Variables are listed in name order so the block is deterministic for a
/// given context.
pub fn render_system_block(context: &ExecutionContext) -> String {
    let mut block = String::from(
        "You write short rhai analysis scripts that run in a restricted sandbox.\n\n\
         Available variables:\n",
    );

    let mut names: Vec<&String> = context.variables.keys().collect();
    names.sort();
    for name in names {
        block.push_str(&format!("- `{name}`: {}\n", context.variables[name]));
    }

    block.push_str("\nAllowed modules (nothing else exists):\n");
    for module in &context.allowed_modules {
        block.push_str(&format!("- {module}\n"));
    }

    block.push_str(
        "\nRules:\n\
         - Write inline statements only; do not define functions or closures you do not need\n\
         - Do not use eval, file access, process control, or interactive input\n\
         - Import only the modules listed above, with `import \"name\" as alias;`\n\
         - The script must end by binding the final value: `let result = ...;`\n",
    );

    if let Some(preview) = &context.sample_preview {
        block.push_str(&format!("\nSample of the data (for reference only):\n{preview}\n"));
    }

    block
}

/// Renders the first-attempt task block.
pub fn render_task_block(request: &AnalysisRequest) -> String {
    let mut block = format!(
        "Task: {}\n\nExpected output: {}\n",
        request.task, request.expected_output
    );

    if let Some(hint) = &request.hint {
        block.push_str(&format!("\nHint: {hint}\n"));
    }

    if !request.constraints.is_empty() {
        block.push_str("\nConstraints:\n");
        for (i, constraint) in request.constraints.iter().enumerate() {
            block.push_str(&format!("{}. {constraint}\n", i + 1));
        }
    }

    block.push_str("\nRespond with the script in a fenced code block.\n");
    block
}

/// Renders a repair task block: the failed snippet and the failure reason,
/// verbatim, plus the original task.
pub fn render_repair_block(
    request: &AnalysisRequest,
    previous_snippet: &str,
    failure_reason: &str,
) -> String {
    format!(
        "Your previous script for this task failed.\n\n\
         Task: {}\n\nExpected output: {}\n\n\
         Previous script:\n```rhai\n{previous_snippet}\n```\n\n\
         Failure reason: {failure_reason}\n\n\
         Fix the problem and respond with the complete corrected script in a \
         fenced code block. All original rules still apply.\n",
        request.task, request.expected_output
    )
}
