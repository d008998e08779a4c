//! Oracle inputs and outputs: translation context, candidate, usage metadata.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::rules::RuleSet;

/// Target language identifier sent to the oracle.
pub const TARGET_LANGUAGE: &str = "rust";

/// Files every candidate must contain to be buildable.
pub const REQUIRED_FILES: [&str; 2] = ["Cargo.toml", "src/main.rs"];

/// The program being migrated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalProgram {
    /// File name shown to the oracle (e.g. `app.py`).
    pub name: String,
    /// Location on disk, substituted into the launch command.
    pub path: PathBuf,
    pub source: String,
}

impl OriginalProgram {
    /// Read a source file, rejecting missing or empty ones.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if source.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "source file {} is empty",
                path.display()
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            name,
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            source: source.into(),
        }
    }
}

/// Resource usage reported by (or estimated for) the translation oracle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OracleUsage {
    /// Model identifier, when the oracle reports one.
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub prompt_tokens: u64,

    #[serde(default)]
    pub completion_tokens: u64,

    /// Wall time spent in oracle calls, retries included.
    #[serde(default)]
    pub latency_ms: u64,

    /// Estimated cost in USD.
    #[serde(default)]
    pub cost_usd: f64,

    /// Number of oracle calls, transient retries included.
    #[serde(default)]
    pub calls: u32,
}

impl OracleUsage {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Sum token, latency, cost and call counters into `self`.
    pub fn accumulate(&mut self, other: &OracleUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.latency_ms += other.latency_ms;
        self.cost_usd += other.cost_usd;
        self.calls += other.calls;
        if self.model.is_none() {
            self.model = other.model.clone();
        }
    }
}

/// Generated source tree for one attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    /// Relative path -> file contents.
    pub files: BTreeMap<String, String>,

    /// Oracle metadata for the call that produced this candidate.
    #[serde(default)]
    pub usage: OracleUsage,
}

impl Candidate {
    pub fn new(files: BTreeMap<String, String>) -> Self {
        Self {
            files,
            usage: OracleUsage::default(),
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    pub fn with_usage(mut self, usage: OracleUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Contents of `src/main.rs`, if present.
    pub fn main_source(&self) -> Option<&str> {
        self.files.get("src/main.rs").map(String::as_str)
    }

    /// Required files this candidate lacks.
    pub fn missing_files(&self) -> Vec<&'static str> {
        REQUIRED_FILES
            .iter()
            .copied()
            .filter(|f| !self.files.contains_key(*f))
            .collect()
    }
}

/// Where a piece of feedback came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Build,
    Verification,
}

/// One prior-attempt diagnostic, quoted to the oracle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackItem {
    pub kind: FeedbackKind,

    /// Build stage or critical-difference category the item concerns.
    pub subject: String,

    /// Text quoted verbatim to the oracle.
    pub text: String,
}

/// Immutable per-attempt input to the translation oracle.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationContext {
    /// 1-based attempt index.
    pub attempt: u32,

    /// File name of the original program (e.g. `app.py`).
    pub source_name: String,

    pub original_source: String,

    pub target_language: String,

    /// Diagnostics from the previous attempt; empty on attempt 1.
    pub prior_diagnostics: Vec<FeedbackItem>,

    /// Critical and ignorable differences the candidate is judged by.
    pub rules: RuleSet,

    /// Files of the previous attempt's candidate, for repair rather than regeneration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_candidate: Option<BTreeMap<String, String>>,
}

impl TranslationContext {
    pub fn is_retry(&self) -> bool {
        self.attempt > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_original_program_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("factorial.py");
        std::fs::write(&path, "print(24)\n").expect("write");
        let program = OriginalProgram::load(&path).expect("load");
        assert_eq!(program.name, "factorial.py");

        let empty = dir.path().join("empty.py");
        std::fs::write(&empty, "  \n").expect("write");
        assert!(OriginalProgram::load(&empty).is_err());
        assert!(OriginalProgram::load(&dir.path().join("missing.py")).is_err());
    }

    #[test]
    fn test_missing_files() {
        let candidate = Candidate::default().with_file("src/main.rs", "fn main() {}");
        assert_eq!(candidate.missing_files(), vec!["Cargo.toml"]);
        assert_eq!(candidate.main_source(), Some("fn main() {}"));
    }

    #[test]
    fn test_usage_accumulate() {
        let mut total = OracleUsage::default();
        total.accumulate(&OracleUsage {
            model: Some("m".into()),
            prompt_tokens: 10,
            completion_tokens: 5,
            latency_ms: 100,
            cost_usd: 0.5,
            calls: 2,
        });
        total.accumulate(&OracleUsage {
            prompt_tokens: 1,
            calls: 1,
            ..OracleUsage::default()
        });
        assert_eq!(total.total_tokens(), 16);
        assert_eq!(total.calls, 3);
        assert_eq!(total.model.as_deref(), Some("m"));
    }

    #[test]
    fn test_context_serializes_without_previous_candidate() {
        let ctx = TranslationContext {
            attempt: 1,
            source_name: "app.py".into(),
            original_source: "print(24)".into(),
            target_language: TARGET_LANGUAGE.into(),
            prior_diagnostics: Vec::new(),
            rules: RuleSet::empty(),
            previous_candidate: None,
        };
        let json = serde_json::to_value(&ctx).expect("serialize");
        assert_eq!(json["target_language"], "rust");
        assert!(json.get("previous_candidate").is_none());
        assert!(json["rules"]["critical_differences"].is_object());
        assert!(!ctx.is_retry());
    }
}
