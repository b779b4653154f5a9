//! Static safety gate for generated snippets.
//!
//! `validate` is pure and deterministic: it parses the snippet with the
//! script engine's own front end (nothing is ever executed), scans the raw
//! text against the configured forbidden-construct patterns, checks imports
//! against the module denylist/allowlist, and warns when the snippet never
//! binds the reserved `result` name.
//!
//! Validity is decided by errors alone; warnings are advisory and never
//! block execution.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use rhai::Engine;

use crate::config::ValidationConfig;
use crate::model::ValidationVerdict;

/// Matches rhai's single import form: `import "name"` / `import "name" as x`.
static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"import\s+"([^"]+)""#).expect("import regex"));

/// Matches a top-level binding of the reserved `result` name
/// (`let result = …`, `const result = …` or a bare re-assignment).
static RESULT_BINDING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:let\s+|const\s+)?result\s*=[^=]").expect("result regex")
});

pub struct Validator {
    engine: Engine,
    forbidden: Vec<(Regex, String)>,
    denylist: Vec<String>,
    allowlist: Vec<String>,
}

impl Validator {
    /// Compiles the configured patterns once. Pattern compilation is the
    /// only fallible part of the validator; `validate` itself never fails.
    pub fn new(config: &ValidationConfig) -> Result<Self> {
        let mut forbidden = Vec::with_capacity(config.forbidden.len());
        for rule in &config.forbidden {
            let re = RegexBuilder::new(&rule.pattern)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("invalid forbidden pattern: {}", rule.pattern))?;
            forbidden.push((re, rule.description.clone()));
        }
        Ok(Self {
            engine: Engine::new(),
            forbidden,
            denylist: config.module_denylist.clone(),
            allowlist: config.module_allowlist.clone(),
        })
    }

    /// Validates a snippet without executing it.
    ///
    /// A parse failure short-circuits with exactly one error; all other
    /// checks run unconditionally and accumulate independently.
    pub fn validate(&self, snippet: &str) -> ValidationVerdict {
        if let Err(e) = self.engine.compile(snippet) {
            let line = e.1.line().unwrap_or(0);
            return ValidationVerdict::new(
                vec![format!("syntax error on line {line}: {}", e.0)],
                vec![],
            );
        }

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // Presence per pattern, not per occurrence
        for (re, description) in &self.forbidden {
            if re.is_match(snippet) {
                errors.push(format!("forbidden construct: {description}"));
            }
        }

        self.scan_imports(snippet, &mut errors, &mut warnings);

        if !RESULT_BINDING_RE.is_match(snippet) {
            warnings.push("snippet never binds `result`; it will run but report no value".to_string());
        }

        ValidationVerdict::new(errors, warnings)
    }

    /// Denylist takes precedence over the allowlist when a name sits in both.
    fn scan_imports(&self, snippet: &str, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
        let mut seen: Vec<&str> = Vec::new();
        for cap in IMPORT_RE.captures_iter(snippet) {
            let name = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
            if seen.contains(&name) {
                continue;
            }
            seen.push(name);

            if self.denylist.iter().any(|d| d == name) {
                errors.push(format!("import of denied module `{name}`"));
            } else if !self.allowlist.iter().any(|a| a == name) {
                warnings.push(format!("unknown module `{name}`"));
            }
        }
    }
}
