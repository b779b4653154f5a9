//! Engine configuration.
//!
//! Everything that shapes behavior — attempt budget, execution deadline,
//! result-size cap, the forbidden-pattern list and the module
//! denylist/allowlist — is supplied here, never hard-coded in components.
//! `Default` ships a usable built-in policy so the engine works without a
//! config file; `Config::load` reads a TOML file with `${ENV_VAR}`
//! substitution.

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub validation: ValidationConfig,
    pub execution: ExecutionConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    /// Supports ${ENV_VAR} substitution
    pub api_key: String,
    pub max_tokens_per_request: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            api_key: String::new(),
            max_tokens_per_request: 4096,
        }
    }
}

/// One forbidden-construct rule: a case-insensitive regex and the
/// human-readable description reported when it matches.
#[derive(Debug, Deserialize, Clone)]
pub struct ForbiddenPattern {
    pub pattern: String,
    pub description: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ValidationConfig {
    /// Ordered scan list; each pattern reports at most once per snippet.
    pub forbidden: Vec<ForbiddenPattern>,
    /// Module names that are always an error to import.
    pub module_denylist: Vec<String>,
    /// Module names known to the sandbox; imports outside this list are
    /// flagged as warnings ("unknown module").
    pub module_allowlist: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let forbidden = [
            (r"\b(spawn|exec|system|command)\s*\(", "process or OS control"),
            (r"\beval\s*\(", "dynamic code evaluation"),
            (r"\b(Fn|curry|call)\s*\(", "dynamic function dispatch"),
            (
                r"\b(open|read_file|write_file|remove_file|append_file)\s*\(",
                "raw file access",
            ),
            (r"\binput\s*\(", "interactive input"),
            (r"\b(breakpoint|debugger)\b", "debugger breakpoint"),
        ];
        Self {
            forbidden: forbidden
                .into_iter()
                .map(|(pattern, description)| ForbiddenPattern {
                    pattern: pattern.to_string(),
                    description: description.to_string(),
                })
                .collect(),
            module_denylist: vec!["os", "process", "fs", "net", "sys"]
                .into_iter()
                .map(String::from)
                .collect(),
            module_allowlist: vec!["stats", "math", "time", "table"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Wall-clock deadline per execution, in milliseconds.
    pub deadline_ms: u64,
    /// Byte cap on the reported textual rendering of `result`.
    pub max_result_bytes: usize,
    /// Ceilings enforced by the script engine; exceeding any of them is
    /// reported as a memory-limit failure.
    pub max_array_size: usize,
    pub max_string_size: usize,
    pub max_map_size: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 5_000,
            max_result_bytes: 4_096,
            max_array_size: 1_000_000,
            max_string_size: 1_000_000,
            max_map_size: 100_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    /// Repair attempts after the first; total attempts ≤ max_retries + 1.
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 2 }
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        // Expand environment variables like ${ANTHROPIC_API_KEY}
        let expanded = shellexpand::env(&content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_ship_usable_policy() {
        let config = Config::default();
        assert!(!config.validation.forbidden.is_empty());
        assert!(config.validation.module_denylist.contains(&"os".to_string()));
        assert!(config.validation.module_allowlist.contains(&"stats".to_string()));
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.execution.deadline_ms, 5_000);
    }

    #[test]
    fn test_load_partial_toml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[retry]\nmax_retries = 5\n\n[execution]\ndeadline_ms = 250\n"
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.execution.deadline_ms, 250);
        // Untouched sections come from defaults
        assert_eq!(config.execution.max_result_bytes, 4_096);
        assert!(!config.validation.forbidden.is_empty());
    }

    #[test]
    fn test_load_expands_env_vars() {
        std::env::set_var("TIDEPOOL_TEST_KEY", "sk-test-123");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[llm]\napi_key = \"${{TIDEPOOL_TEST_KEY}}\"\n").unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.llm.api_key, "sk-test-123");
    }

    #[test]
    fn test_load_custom_forbidden_patterns() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[[validation.forbidden]]\npattern = \"launch_missiles\"\ndescription = \"no\"\n"
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.validation.forbidden.len(), 1);
        assert_eq!(config.validation.forbidden[0].description, "no");
    }
}
