//! Feedback synthesis: what the oracle is told about the previous attempt.
//!
//! Only the immediately previous attempt contributes. A failed build yields
//! its blocking diagnostics; a failed verification yields the failing
//! categories with their explanations. The two are never mixed.

use crate::domain::{Attempt, AttemptOutcome, FeedbackItem, FeedbackKind};

/// Feedback items derived from `previous`, or empty when there is none.
pub fn feedback_from(previous: Option<&Attempt>) -> Vec<FeedbackItem> {
    let Some(previous) = previous else {
        return Vec::new();
    };

    match previous.outcome {
        AttemptOutcome::FailedBuild => previous
            .build_report
            .blocking_diagnostics()
            .map(|diag| FeedbackItem {
                kind: FeedbackKind::Build,
                subject: diag.source.as_str().to_string(),
                text: diag.render(),
            })
            .collect(),
        AttemptOutcome::FailedVerification => previous
            .verification_report
            .as_ref()
            .map(|report| {
                report
                    .failing()
                    .map(|result| FeedbackItem {
                        kind: FeedbackKind::Verification,
                        subject: result.category.to_string(),
                        text: format!(
                            "{} ({}): {}",
                            result.category,
                            result.verdict.as_str(),
                            result.explanation
                        ),
                    })
                    .collect()
            })
            .unwrap_or_default(),
        AttemptOutcome::Succeeded | AttemptOutcome::Aborted => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AttemptUsage, BuildReport, BuildVerdict, Candidate, CategoryResult, Diagnostic,
        DiagnosticSource, Severity, VerificationReport,
    };
    use crate::rules::{Category, LintPolicy};
    use chrono::Utc;

    fn attempt(
        outcome: AttemptOutcome,
        build: BuildReport,
        verify: Option<VerificationReport>,
    ) -> Attempt {
        Attempt {
            index: 1,
            timestamp: Utc::now(),
            outcome,
            candidate: Candidate::default(),
            build_report: build,
            verification_report: verify,
            usage: AttemptUsage::default(),
            error: None,
        }
    }

    #[test]
    fn test_first_attempt_has_no_feedback() {
        assert!(feedback_from(None).is_empty());
    }

    #[test]
    fn test_build_failure_quotes_diagnostic_verbatim() {
        let rendered = "error[E0308]: mismatched types\n --> src/main.rs:3:5";
        let mut build = BuildReport::failed_with("unused", LintPolicy::Advisory);
        build.diagnostics = vec![
            Diagnostic::new(Severity::Error, "mismatched types", DiagnosticSource::Rustc)
                .with_evidence(rendered),
            Diagnostic::new(Severity::Warning, "unused variable", DiagnosticSource::Rustc),
            Diagnostic::new(Severity::Error, "needless_return", DiagnosticSource::Clippy),
        ];

        let items = feedback_from(Some(&attempt(AttemptOutcome::FailedBuild, build, None)));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, FeedbackKind::Build);
        assert_eq!(items[0].subject, "rustc");
        assert_eq!(items[0].text, rendered);
    }

    #[test]
    fn test_verification_failure_lists_failing_categories_only() {
        let mut build = BuildReport::failed_with("unused", LintPolicy::Advisory);
        build.verdict = BuildVerdict::Pass;
        build.diagnostics.clear();
        let report = VerificationReport::new()
            .with_result(CategoryResult::pass(Category::Core, "24 == 24"))
            .with_result(CategoryResult::fail(
                Category::Routing,
                "GET /primes/10: original 200, candidate 404",
            ));

        let items = feedback_from(Some(&attempt(
            AttemptOutcome::FailedVerification,
            build,
            Some(report),
        )));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, FeedbackKind::Verification);
        assert_eq!(items[0].subject, "routing");
        assert!(items[0].text.contains("candidate 404"));
    }
}
