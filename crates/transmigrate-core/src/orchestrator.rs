//! Repair orchestrator: the bounded generate-build-verify-repair loop.
//!
//! One job runs its attempts strictly in sequence:
//!
//! ```text
//! Idle -> Generating -> Building -> Verifying -> Deciding
//!      -> Accepted | Retrying | Exhausted | Aborted
//! ```
//!
//! Every completed attempt is appended to the job's [`Ledger`] and persisted
//! before the next one starts. An attempt interrupted by cancellation or the
//! job timeout is dropped (killing its subprocesses and removing its
//! workspace) and never recorded.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::Instrument;
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::domain::{
    AbortReason, Attempt, AttemptOutcome, AttemptUsage, BuildReport, BuildVerdict, ConfigError,
    Diagnostic, DiagnosticSource, JobResult, JobStatus, MigrationError, OriginalProgram, Severity,
    TranslationContext, TARGET_LANGUAGE,
};
use crate::feedback::feedback_from;
use crate::ledger::Ledger;
use crate::obs;
use crate::oracle::{translate_with_retry, OracleFailure, RetryPolicy, TranslationOracle};
use crate::rules::{LintPolicy, RuleSet};
use crate::stages::{BuildStage, VerifyStage};
use crate::store::LedgerStore;
use crate::workspace::{candidate_problems, AttemptWorkspace};

/// State-machine phases, logged at every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Generating,
    Building,
    Verifying,
    Deciding,
    Accepted,
    Retrying,
    Exhausted,
    Aborted,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Generating => "generating",
            Phase::Building => "building",
            Phase::Verifying => "verifying",
            Phase::Deciding => "deciding",
            Phase::Accepted => "accepted",
            Phase::Retrying => "retrying",
            Phase::Exhausted => "exhausted",
            Phase::Aborted => "aborted",
        }
    }
}

/// Everything one migration job needs besides the shared stages.
#[derive(Debug, Clone)]
pub struct MigrationJob {
    pub original: OriginalProgram,
    pub rules: Arc<RuleSet>,
    pub max_attempts: u32,
    pub job_timeout: Option<Duration>,
    pub cancel: CancellationToken,
    /// Audit trail location; nothing is written when `None`.
    pub store: Option<LedgerStore>,
}

impl MigrationJob {
    pub fn new(original: OriginalProgram, rules: Arc<RuleSet>, max_attempts: u32) -> Self {
        Self {
            original,
            rules,
            max_attempts,
            job_timeout: None,
            cancel: CancellationToken::new(),
            store: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_store(mut self, store: LedgerStore) -> Self {
        self.store = Some(store);
        self
    }
}

/// Result of one attempt that ran to completion (or failed to reach the oracle).
enum Step {
    Recorded(Attempt),
    OracleFailed(OracleFailure),
}

enum Interrupt {
    Cancelled,
    TimedOut,
}

async fn deadline_elapsed(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Drives attempts for migration jobs. Shared across concurrent jobs.
pub struct Orchestrator {
    oracle: Arc<dyn TranslationOracle>,
    builder: Arc<dyn BuildStage>,
    verifier: Arc<dyn VerifyStage>,
    retry: RetryPolicy,
    workspace_root: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(
        oracle: Arc<dyn TranslationOracle>,
        builder: Arc<dyn BuildStage>,
        verifier: Arc<dyn VerifyStage>,
    ) -> Self {
        Self {
            oracle,
            builder,
            verifier,
            retry: RetryPolicy::default(),
            workspace_root: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Create attempt workspaces under `root` instead of the system temp dir.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// Run one job to a terminal status.
    ///
    /// `Err` only for conditions that prevent the job from starting
    /// (`max_attempts < 1`, unusable output directory). Build, verification,
    /// oracle and persistence failures all end in a [`JobResult`].
    pub async fn run(&self, job: MigrationJob) -> Result<JobResult, MigrationError> {
        if job.max_attempts < 1 {
            return Err(ConfigError::InvalidMaxAttempts(job.max_attempts).into());
        }
        if let Some(store) = &job.store {
            store.prepare()?;
        }

        let job_id = Uuid::new_v4();
        let span = obs::job_span(&job_id.to_string(), &job.original.name);
        self.run_job(job_id, job).instrument(span).await
    }

    async fn run_job(&self, job_id: Uuid, job: MigrationJob) -> Result<JobResult, MigrationError> {
        let job_label = job_id.to_string();
        obs::emit_job_started(&job_label, &job.original.name, job.max_attempts);
        obs::emit_phase(1, Phase::Idle);

        let started_at = Utc::now();
        let clock = Instant::now();
        let deadline = job
            .job_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);
        let mut ledger = Ledger::new();

        let status = loop {
            let index = ledger.next_index();

            let step = tokio::select! {
                biased;
                _ = job.cancel.cancelled() => Err(Interrupt::Cancelled),
                _ = deadline_elapsed(deadline) => Err(Interrupt::TimedOut),
                step = self.attempt(&job, index, ledger.last()) => Ok(step),
            };

            let attempt = match step {
                Err(interrupt) => {
                    obs::emit_phase(index, Phase::Aborted);
                    break JobStatus::Aborted {
                        reason: match interrupt {
                            Interrupt::Cancelled => AbortReason::Cancelled,
                            Interrupt::TimedOut => AbortReason::JobTimeout,
                        },
                    };
                }
                Ok(Step::OracleFailed(failure)) => {
                    obs::emit_phase(index, Phase::Aborted);
                    break JobStatus::Aborted {
                        reason: match failure {
                            OracleFailure::Unavailable { calls, last_error } => {
                                AbortReason::OracleUnavailable {
                                    message: format!("{} (after {} calls)", last_error, calls),
                                }
                            }
                            OracleFailure::Fatal(message) => AbortReason::OracleFatal { message },
                        },
                    };
                }
                Ok(Step::Recorded(attempt)) => attempt,
            };

            let outcome = attempt.outcome;
            let error = attempt.error.clone();
            obs::emit_attempt_finished(index, outcome, attempt.usage.total_ms);
            if let Err(reason) = record_attempt(&mut ledger, attempt) {
                obs::emit_phase(index, Phase::Aborted);
                break JobStatus::Aborted { reason };
            }

            if let (Some(store), Some(recorded)) = (&job.store, ledger.last()) {
                if let Err(e) = store.persist_attempt(recorded) {
                    obs::emit_persist_error(&job_label, &e);
                    obs::emit_phase(index, Phase::Aborted);
                    break JobStatus::Aborted {
                        reason: AbortReason::Infrastructure {
                            message: format!("failed to persist attempt {}: {}", index, e),
                        },
                    };
                }
            }

            match outcome {
                AttemptOutcome::Succeeded => {
                    obs::emit_phase(index, Phase::Accepted);
                    break JobStatus::Accepted { attempt: index };
                }
                AttemptOutcome::Aborted => {
                    obs::emit_phase(index, Phase::Aborted);
                    break JobStatus::Aborted {
                        reason: AbortReason::Infrastructure {
                            message: error.unwrap_or_else(|| "stage failed".to_string()),
                        },
                    };
                }
                AttemptOutcome::FailedBuild | AttemptOutcome::FailedVerification => {
                    if index >= job.max_attempts {
                        obs::emit_phase(index, Phase::Exhausted);
                        break JobStatus::Exhausted {
                            attempts: ledger.attempts().iter().map(Attempt::summary).collect(),
                        };
                    }
                    obs::emit_phase(index, Phase::Retrying);
                }
            }
        };

        let result = JobResult {
            job_id,
            source_name: job.original.name.clone(),
            status,
            ledger,
            started_at,
            finished_at: Utc::now(),
        };

        if let Some(store) = &job.store {
            if let Err(e) = store.finalize(&result) {
                obs::emit_persist_error(&job_label, &e);
            }
        }

        obs::emit_job_finished(
            &job_label,
            &result.status,
            result.ledger.len(),
            elapsed_ms(clock),
        );
        Ok(result)
    }

    /// One generate-build-verify cycle.
    async fn attempt(&self, job: &MigrationJob, index: u32, previous: Option<&Attempt>) -> Step {
        let timestamp = Utc::now();
        let started = Instant::now();
        let lint_policy = job.rules.lint_policy();

        obs::emit_phase(index, Phase::Generating);
        let ctx = TranslationContext {
            attempt: index,
            source_name: job.original.name.clone(),
            original_source: job.original.source.clone(),
            target_language: TARGET_LANGUAGE.to_string(),
            prior_diagnostics: feedback_from(previous),
            rules: job.rules.as_ref().clone(),
            previous_candidate: previous.map(|a| a.candidate.files.clone()),
        };
        let candidate = match translate_with_retry(self.oracle.as_ref(), &ctx, &self.retry).await
        {
            Ok(candidate) => candidate,
            Err(failure) => return Step::OracleFailed(failure),
        };

        let mut usage = AttemptUsage {
            oracle: candidate.usage.clone(),
            ..AttemptUsage::default()
        };
        let mut record = Attempt {
            index,
            timestamp,
            outcome: AttemptOutcome::FailedBuild,
            candidate,
            build_report: BuildReport::failed_with("build did not run", lint_policy),
            verification_report: None,
            usage: AttemptUsage::default(),
            error: None,
        };

        obs::emit_phase(index, Phase::Building);
        let build_started = Instant::now();
        let problems = candidate_problems(&record.candidate);
        let workspace = if problems.is_empty() {
            match AttemptWorkspace::materialize(
                &record.candidate,
                index,
                self.workspace_root.as_deref(),
            ) {
                Ok(ws) => match self.builder.build(&ws, &job.rules).await {
                    Ok(report) => {
                        record.build_report = report;
                        Some(ws)
                    }
                    Err(e) => {
                        record.outcome = AttemptOutcome::Aborted;
                        record.error = Some(format!("build stage failed: {}", e));
                        None
                    }
                },
                Err(e) => {
                    record.outcome = AttemptOutcome::Aborted;
                    record.error = Some(format!("could not create attempt workspace: {}", e));
                    None
                }
            }
        } else {
            record.build_report = invalid_candidate_report(problems, lint_policy);
            None
        };
        usage.build_ms = elapsed_ms(build_started);

        if let Some(ws) = &workspace {
            if record.build_report.passed() {
                obs::emit_phase(index, Phase::Verifying);
                let verify_started = Instant::now();
                match self
                    .verifier
                    .verify(&job.original, ws, &job.rules, &record.build_report)
                    .await
                {
                    Ok(report) => {
                        record.outcome = if report.passed() {
                            AttemptOutcome::Succeeded
                        } else {
                            AttemptOutcome::FailedVerification
                        };
                        record.verification_report = Some(report);
                    }
                    Err(e) => {
                        record.outcome = AttemptOutcome::Aborted;
                        record.error = Some(format!("verify stage failed: {}", e));
                    }
                }
                usage.verify_ms = elapsed_ms(verify_started);
            }
        }
        drop(workspace);

        obs::emit_phase(index, Phase::Deciding);
        usage.total_ms = elapsed_ms(started);
        record.usage = usage;
        Step::Recorded(record)
    }
}

/// Failing report for a candidate that cannot be materialized as a crate.
fn invalid_candidate_report(problems: Vec<String>, lint_policy: LintPolicy) -> BuildReport {
    BuildReport {
        verdict: BuildVerdict::Fail,
        diagnostics: problems
            .into_iter()
            .map(|p| Diagnostic::new(Severity::Error, p, DiagnosticSource::Runner))
            .collect(),
        stages: Vec::new(),
        lint_policy,
    }
}

/// Append to the ledger; a rejected append ends the job with the ledger kept.
fn record_attempt(ledger: &mut Ledger, attempt: Attempt) -> Result<(), AbortReason> {
    let index = attempt.index;
    ledger.append(attempt).map_err(|e| AbortReason::Infrastructure {
        message: format!("failed to record attempt {}: {}", index, e),
    })
}
