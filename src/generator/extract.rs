//! Snippet extraction from raw LLM responses.
//!
//! Free-text parsing, so deliberately tolerant: prefer a fenced block
//! tagged with the target language, then any fenced block, then the whole
//! trimmed response. Never fails — a useless extraction is caught by the
//! validator, not here.

use once_cell::sync::Lazy;
use regex::Regex;

static TAGGED_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:rhai|rust)[ \t]*\r?\n(.*?)```").expect("tagged fence regex"));

static ANY_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").expect("any fence regex"));

/// Pulls the snippet out of a raw response using the three-tier fallback.
pub fn extract_snippet(response: &str) -> String {
    if let Some(cap) = TAGGED_FENCE.captures(response) {
        return cap[1].trim().to_string();
    }
    if let Some(cap) = ANY_FENCE.captures(response) {
        return cap[1].trim().to_string();
    }
    response.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_fence_preferred() {
        let response = "Here you go:\n```rhai\nlet result = 1;\n```\nEnjoy!";
        assert_eq!(extract_snippet(response), "let result = 1;");
    }

    #[test]
    fn test_tagged_fence_wins_over_earlier_untagged() {
        let response = "```\nnot this\n```\nand\n```rhai\nlet result = 2;\n```";
        assert_eq!(extract_snippet(response), "let result = 2;");
    }

    #[test]
    fn test_any_fence_fallback() {
        let response = "Sure:\n```\nlet result = 3;\n```";
        assert_eq!(extract_snippet(response), "let result = 3;");
    }

    #[test]
    fn test_foreign_tag_still_matches_any_fence() {
        let response = "```python\nlet result = 4;\n```";
        assert_eq!(extract_snippet(response), "let result = 4;");
    }

    #[test]
    fn test_raw_text_fallback() {
        let response = "  let result = 5;  \n";
        assert_eq!(extract_snippet(response), "let result = 5;");
    }

    #[test]
    fn test_multiline_snippet_preserved() {
        let response = "```rhai\nlet x = 1;\nlet result = x + 1;\n```";
        assert_eq!(extract_snippet(response), "let x = 1;\nlet result = x + 1;");
    }
}
