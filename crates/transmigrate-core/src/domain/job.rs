//! Terminal job status and result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::attempt::{Attempt, AttemptSummary};
use crate::domain::candidate::OracleUsage;
use crate::ledger::Ledger;

/// Why a job ended without exhausting its attempts or accepting a candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    /// Transient oracle failures outlasted the retry budget.
    OracleUnavailable { message: String },
    /// The oracle rejected the request outright.
    OracleFatal { message: String },
    JobTimeout,
    Cancelled,
    /// A build or verify stage could not run at all.
    Infrastructure { message: String },
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::OracleUnavailable { message } => {
                write!(f, "oracle unavailable: {}", message)
            }
            AbortReason::OracleFatal { message } => write!(f, "oracle error: {}", message),
            AbortReason::JobTimeout => f.write_str("job timed out"),
            AbortReason::Cancelled => f.write_str("cancelled"),
            AbortReason::Infrastructure { message } => {
                write!(f, "infrastructure error: {}", message)
            }
        }
    }
}

/// Terminal status of a migration job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Accepted { attempt: u32 },
    Exhausted { attempts: Vec<AttemptSummary> },
    Aborted { reason: AbortReason },
}

impl JobStatus {
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Accepted { .. } => "accepted",
            JobStatus::Exhausted { .. } => "exhausted",
            JobStatus::Aborted { .. } => "aborted",
        }
    }
}

/// Final status plus the full ledger of a job.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: Uuid,
    pub source_name: String,
    pub status: JobStatus,
    pub ledger: Ledger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self.status, JobStatus::Accepted { .. })
    }

    pub fn accepted_attempt(&self) -> Option<&Attempt> {
        match self.status {
            JobStatus::Accepted { attempt } => self.ledger.get(attempt),
            _ => None,
        }
    }

    pub fn summary(&self) -> JobSummary {
        let attempts: Vec<AttemptSummary> =
            self.ledger.attempts().iter().map(Attempt::summary).collect();
        let mut oracle = OracleUsage::default();
        for attempt in self.ledger.attempts() {
            oracle.accumulate(&attempt.usage.oracle);
        }
        JobSummary {
            job_id: self.job_id,
            source_name: self.source_name.clone(),
            status: self.status.clone(),
            attempts,
            oracle_usage: oracle,
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration_ms: (self.finished_at - self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        }
    }
}

/// Serializable job overview written as `summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub source_name: String,
    pub status: JobStatus,
    pub attempts: Vec<AttemptSummary>,
    /// Oracle usage summed over recorded attempts.
    pub oracle_usage: OracleUsage,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization_tags() {
        let status = JobStatus::Aborted {
            reason: AbortReason::OracleUnavailable {
                message: "connection refused".into(),
            },
        };
        let json = serde_json::to_value(&status).expect("serialize");
        assert_eq!(json["status"], "aborted");
        assert_eq!(json["reason"]["reason"], "oracle_unavailable");

        let accepted = serde_json::to_value(JobStatus::Accepted { attempt: 2 }).expect("serialize");
        assert_eq!(accepted["status"], "accepted");
        assert_eq!(accepted["attempt"], 2);
    }

    #[test]
    fn test_abort_reason_display() {
        assert_eq!(AbortReason::Cancelled.to_string(), "cancelled");
        assert!(AbortReason::OracleFatal {
            message: "401".into()
        }
        .to_string()
        .contains("401"));
    }
}
