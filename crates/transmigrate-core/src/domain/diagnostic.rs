//! Normalized build diagnostic types.

use serde::{Deserialize, Serialize};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Hint,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Hint => "hint",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// Tool that produced a diagnostic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSource {
    /// Compiler in check-only mode.
    Rustc,
    /// Lint pass.
    Clippy,
    /// Synthesized by the runner (timeout, spawn failure, unparseable output).
    Runner,
}

impl DiagnosticSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticSource::Rustc => "rustc",
            DiagnosticSource::Clippy => "clippy",
            DiagnosticSource::Runner => "runner",
        }
    }
}

/// Position of a diagnostic inside the candidate source tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceLocation {
    /// Path relative to the candidate root (e.g. `src/main.rs`).
    pub file: String,

    /// Line number (1-indexed).
    pub line: u32,

    /// Column number (1-indexed).
    pub column: u32,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A single normalized diagnostic from build output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnostic {
    /// Severity level.
    pub severity: Severity,

    /// Diagnostic/lint code (e.g. "E0308", "clippy::needless_return").
    pub code: Option<String>,

    /// Human-readable message.
    pub message: String,

    /// Primary location, when the tool reported one.
    pub location: Option<SourceLocation>,

    /// Which tool produced this diagnostic.
    pub source: DiagnosticSource,

    /// Rendered text as the tool printed it, quoted back to the oracle verbatim.
    pub evidence: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic.
    pub fn new(severity: Severity, message: impl Into<String>, source: DiagnosticSource) -> Self {
        Self {
            severity,
            code: None,
            message: message.into(),
            location: None,
            source,
            evidence: None,
        }
    }

    /// Set file location.
    pub fn with_location(mut self, file: impl Into<String>, line: u32, column: u32) -> Self {
        self.location = Some(SourceLocation {
            file: file.into(),
            line,
            column,
        });
        self
    }

    /// Set diagnostic code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Set evidence snippet.
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    /// Whether this diagnostic is an error.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Text used when quoting this diagnostic back to the oracle.
    ///
    /// Prefers the tool's own rendering; otherwise synthesizes
    /// `error[E0308]: message\n --> src/main.rs:3:5`.
    pub fn render(&self) -> String {
        if let Some(evidence) = &self.evidence {
            return evidence.trim_end().to_string();
        }
        let mut out = String::from(self.severity.as_str());
        if let Some(code) = &self.code {
            out.push_str(&format!("[{}]", code));
        }
        out.push_str(": ");
        out.push_str(&self.message);
        if let Some(location) = &self.location {
            out.push_str(&format!("\n --> {}", location));
        }
        out
    }
}
