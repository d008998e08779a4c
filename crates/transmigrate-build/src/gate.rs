//! Build gate evaluation for pass/fail criteria.

use serde::{Deserialize, Serialize};
use transmigrate_core::rules::LintPolicy;

use crate::runner::StageResult;
use crate::stage::StageRole;

/// Gate evaluation verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateVerdict {
    /// Whether the gate passed.
    pub passed: bool,

    /// Violations that caused failure (empty if passed).
    pub violations: Vec<String>,

    /// Failing lint stages that did not block under an advisory policy.
    pub advisories: Vec<String>,

    /// Summary message.
    pub message: String,
}

/// Build gate rules.
pub struct BuildGate;

impl BuildGate {
    /// Evaluate whether the executed stages let the build pass.
    ///
    /// Gate rule:
    /// - A failing compile stage (non-zero exit, timeout, spawn failure) always fails the gate
    /// - A failing lint stage fails the gate only under [`LintPolicy::Blocking`]
    pub fn evaluate(results: &[(StageRole, StageResult)], policy: LintPolicy) -> GateVerdict {
        let mut violations = Vec::new();
        let mut advisories = Vec::new();

        for (role, result) in results {
            if result.passed() {
                continue;
            }
            let reason = failure_reason(result);
            match (role, policy) {
                (StageRole::Compile, _) | (StageRole::Lint, LintPolicy::Blocking) => {
                    violations.push(format!("Stage '{}' {}", result.stage_name, reason));
                }
                (StageRole::Lint, LintPolicy::Advisory) => {
                    advisories.push(format!("Stage '{}' {}", result.stage_name, reason));
                }
            }
        }

        let passed = violations.is_empty();
        let message = if passed {
            if advisories.is_empty() {
                "All stages passed".to_string()
            } else {
                format!("Passed with {} advisory lint finding(s)", advisories.len())
            }
        } else {
            format!("Gate failed with {} violation(s)", violations.len())
        };

        GateVerdict {
            passed,
            violations,
            advisories,
            message,
        }
    }
}

fn failure_reason(result: &StageResult) -> String {
    if let Some(err) = &result.spawn_error {
        format!("could not run: {}", err)
    } else if result.timed_out {
        "timed out".to_string()
    } else {
        match result.exit_code {
            Some(code) => format!("returned non-zero exit code: {}", code),
            None => "was terminated by a signal".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, exit_code: Option<i32>) -> StageResult {
        StageResult {
            stage_name: name.to_string(),
            command: name.to_string(),
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 1,
            success: exit_code == Some(0),
            timed_out: false,
            spawn_error: None,
        }
    }

    #[test]
    fn test_empty_results_passes() {
        let verdict = BuildGate::evaluate(&[], LintPolicy::Blocking);
        assert!(verdict.passed);
    }

    #[test]
    fn test_compile_failure_always_fails() {
        let results = vec![(StageRole::Compile, result("cargo_check", Some(101)))];
        for policy in [LintPolicy::Blocking, LintPolicy::Advisory] {
            let verdict = BuildGate::evaluate(&results, policy);
            assert!(!verdict.passed);
            assert!(verdict.violations[0].contains("101"));
        }
    }

    #[test]
    fn test_lint_failure_blocking() {
        let results = vec![
            (StageRole::Compile, result("cargo_check", Some(0))),
            (StageRole::Lint, result("cargo_clippy", Some(101))),
        ];
        let verdict = BuildGate::evaluate(&results, LintPolicy::Blocking);
        assert!(!verdict.passed);
        assert_eq!(verdict.violations.len(), 1);
        assert!(verdict.advisories.is_empty());
    }

    #[test]
    fn test_lint_failure_advisory() {
        let results = vec![
            (StageRole::Compile, result("cargo_check", Some(0))),
            (StageRole::Lint, result("cargo_clippy", Some(101))),
        ];
        let verdict = BuildGate::evaluate(&results, LintPolicy::Advisory);
        assert!(verdict.passed);
        assert_eq!(verdict.advisories.len(), 1);
        assert!(verdict.message.contains("advisory"));
    }

    #[test]
    fn test_timeout_is_violation() {
        let mut timed_out = result("cargo_check", None);
        timed_out.timed_out = true;
        let verdict = BuildGate::evaluate(&[(StageRole::Compile, timed_out)], LintPolicy::Advisory);
        assert!(!verdict.passed);
        assert!(verdict.violations[0].contains("timed out"));
    }
}
