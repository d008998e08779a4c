//! Finalized migration attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::candidate::{Candidate, OracleUsage};
use crate::domain::report::{BuildReport, BuildVerdict, VerificationReport};
use crate::rules::Category;

/// Outcome tag of a finalized attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    FailedBuild,
    FailedVerification,
    /// A build or verify stage hit an unrecoverable infrastructure error.
    Aborted,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Succeeded => "succeeded",
            AttemptOutcome::FailedBuild => "failed_build",
            AttemptOutcome::FailedVerification => "failed_verification",
            AttemptOutcome::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resources consumed by one attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AttemptUsage {
    pub oracle: OracleUsage,
    pub build_ms: u64,
    pub verify_ms: u64,
    pub total_ms: u64,
}

/// One finalized attempt. Never mutated after it is appended to a ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attempt {
    /// 1-based, monotonic within a ledger.
    pub index: u32,

    pub timestamp: DateTime<Utc>,

    pub outcome: AttemptOutcome,

    pub candidate: Candidate,

    pub build_report: BuildReport,

    /// Absent when the build failed and verification never ran.
    pub verification_report: Option<VerificationReport>,

    pub usage: AttemptUsage,

    /// Infrastructure error text for `Aborted` attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Attempt {
    pub fn succeeded(&self) -> bool {
        self.outcome == AttemptOutcome::Succeeded
    }

    pub fn summary(&self) -> AttemptSummary {
        AttemptSummary {
            index: self.index,
            outcome: self.outcome,
            timestamp: self.timestamp,
            build_verdict: self.build_report.verdict,
            build_errors: self.build_report.blocking_diagnostics().count(),
            failing_categories: self
                .verification_report
                .as_ref()
                .map(VerificationReport::failing_categories)
                .unwrap_or_default(),
            usage: self.usage.clone(),
        }
    }
}

/// Compact view of an attempt, used in job status and `summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttemptSummary {
    pub index: u32,
    pub outcome: AttemptOutcome,
    pub timestamp: DateTime<Utc>,
    pub build_verdict: BuildVerdict,
    pub build_errors: usize,
    pub failing_categories: Vec<Category>,
    pub usage: AttemptUsage,
}
