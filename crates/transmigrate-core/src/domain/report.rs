//! Build and verification reports.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::diagnostic::{Diagnostic, DiagnosticSource, Severity};
use crate::rules::{Category, LintPolicy};

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

/// Overall verdict of a build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildVerdict {
    Pass,
    Fail,
}

/// Raw record of one build stage execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageRecord {
    /// Stage name (e.g. "cargo_check").
    pub name: String,

    /// Command line as executed.
    pub command: String,

    /// Process exit code (None if killed or never started).
    pub exit_code: Option<i32>,

    pub duration_ms: u64,

    pub success: bool,

    /// Whether a failure of this stage fails the build.
    pub blocking: bool,

    #[serde(default)]
    pub timed_out: bool,

    pub stdout: String,

    pub stderr: String,
}

/// Result of building one candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildReport {
    pub verdict: BuildVerdict,

    /// Normalized diagnostics from all stages, in report order.
    pub diagnostics: Vec<Diagnostic>,

    pub stages: Vec<StageRecord>,

    /// Lint policy the verdict was computed under.
    pub lint_policy: LintPolicy,
}

impl BuildReport {
    /// Failing report carrying a single runner-synthesized error.
    pub fn failed_with(message: impl Into<String>, lint_policy: LintPolicy) -> Self {
        Self {
            verdict: BuildVerdict::Fail,
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                message,
                DiagnosticSource::Runner,
            )],
            stages: Vec::new(),
            lint_policy,
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict == BuildVerdict::Pass
    }

    /// Error diagnostics that block acceptance under the report's lint policy.
    pub fn blocking_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        let lint_blocks = self.lint_policy == LintPolicy::Blocking;
        self.diagnostics
            .iter()
            .filter(move |d| d.is_error() && (d.source != DiagnosticSource::Clippy || lint_blocks))
    }

    /// Lint findings that did not fail the build.
    pub fn advisory_findings(&self) -> impl Iterator<Item = &Diagnostic> {
        let lint_blocks = self.lint_policy == LintPolicy::Blocking;
        self.diagnostics
            .iter()
            .filter(move |d| d.source == DiagnosticSource::Clippy && !lint_blocks)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn duration_ms(&self) -> u64 {
        self.stages.iter().map(|s| s.duration_ms).sum()
    }

    /// Human-readable stage log.
    pub fn render_log(&self) -> String {
        let mut out = String::new();
        for stage in &self.stages {
            out.push_str(&format!(
                "== {} ({}) ==\ncommand: {}\nexit: {}\nduration: {}ms\n",
                stage.name,
                if stage.success { "ok" } else { "failed" },
                stage.command,
                stage
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none".to_string()),
                stage.duration_ms
            ));
            if stage.timed_out {
                out.push_str("timed out\n");
            }
            out.push_str("--- stdout ---\n");
            out.push_str(&stage.stdout);
            if !stage.stdout.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("--- stderr ---\n");
            out.push_str(&stage.stderr);
            if !stage.stderr.ends_with('\n') {
                out.push('\n');
            }
        }
        if self.stages.is_empty() {
            for diag in &self.diagnostics {
                out.push_str(&diag.render());
                out.push('\n');
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verdict of one critical-difference category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CategoryVerdict {
    Pass,
    Fail,
    /// A program failed to start, crashed, or timed out before the
    /// observation this category needs was produced.
    ExecutionError,
}

impl CategoryVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryVerdict::Pass => "pass",
            CategoryVerdict::Fail => "fail",
            CategoryVerdict::ExecutionError => "execution_error",
        }
    }
}

/// Outcome of comparing one category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryResult {
    pub category: Category,
    pub verdict: CategoryVerdict,
    /// Human-diffable explanation (expected vs actual).
    pub explanation: String,
}

impl CategoryResult {
    pub fn pass(category: Category, explanation: impl Into<String>) -> Self {
        Self {
            category,
            verdict: CategoryVerdict::Pass,
            explanation: explanation.into(),
        }
    }

    pub fn fail(category: Category, explanation: impl Into<String>) -> Self {
        Self {
            category,
            verdict: CategoryVerdict::Fail,
            explanation: explanation.into(),
        }
    }

    pub fn execution_error(category: Category, explanation: impl Into<String>) -> Self {
        Self {
            category,
            verdict: CategoryVerdict::ExecutionError,
            explanation: explanation.into(),
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict == CategoryVerdict::Pass
    }
}

/// Per-category verdicts for one candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VerificationReport {
    pub results: BTreeMap<Category, CategoryResult>,
}

impl VerificationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, result: CategoryResult) {
        self.results.insert(result.category, result);
    }

    pub fn with_result(mut self, result: CategoryResult) -> Self {
        self.insert(result);
        self
    }

    pub fn get(&self, category: Category) -> Option<&CategoryResult> {
        self.results.get(&category)
    }

    /// AND over evaluated categories.
    pub fn passed(&self) -> bool {
        self.results.values().all(CategoryResult::passed)
    }

    pub fn failing(&self) -> impl Iterator<Item = &CategoryResult> {
        self.results.values().filter(|r| !r.passed())
    }

    pub fn failing_categories(&self) -> Vec<Category> {
        self.failing().map(|r| r.category).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(policy: LintPolicy) -> BuildReport {
        BuildReport {
            verdict: BuildVerdict::Pass,
            diagnostics: vec![
                Diagnostic::new(Severity::Error, "mismatched types", DiagnosticSource::Rustc),
                Diagnostic::new(Severity::Error, "needless return", DiagnosticSource::Clippy),
                Diagnostic::new(Severity::Warning, "unused import", DiagnosticSource::Rustc),
            ],
            stages: Vec::new(),
            lint_policy: policy,
        }
    }

    #[test]
    fn test_blocking_diagnostics_follow_lint_policy() {
        assert_eq!(report(LintPolicy::Blocking).blocking_diagnostics().count(), 2);
        assert_eq!(report(LintPolicy::Advisory).blocking_diagnostics().count(), 1);
        assert_eq!(report(LintPolicy::Advisory).advisory_findings().count(), 1);
        assert_eq!(report(LintPolicy::Blocking).advisory_findings().count(), 0);
    }

    #[test]
    fn test_counts() {
        let r = report(LintPolicy::Advisory);
        assert_eq!(r.error_count(), 2);
        assert_eq!(r.warning_count(), 1);
    }

    #[test]
    fn test_failed_with_renders_log() {
        let r = BuildReport::failed_with("workspace unavailable", LintPolicy::Advisory);
        assert!(!r.passed());
        assert!(r.render_log().contains("error: workspace unavailable"));
    }

    #[test]
    fn test_verification_overall_is_and() {
        let mut report = VerificationReport::new();
        assert!(report.passed());

        report.insert(CategoryResult::pass(Category::Core, "24 == 24"));
        assert!(report.passed());

        report.insert(CategoryResult::execution_error(Category::Routing, "original timed out"));
        assert!(!report.passed());
        assert_eq!(report.failing_categories(), vec![Category::Routing]);
    }

    #[test]
    fn test_verification_report_keys_serialize_as_names() {
        let report = VerificationReport::new().with_result(CategoryResult::fail(
            Category::Template,
            "tag tree differs",
        ));
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["results"]["template"]["verdict"], "fail");
    }
}
