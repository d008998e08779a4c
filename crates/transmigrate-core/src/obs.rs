//! Structured observability hooks for the migration job lifecycle.
//!
//! Library code only emits events; binaries install the subscriber via
//! [`crate::telemetry::init_tracing`].

use tracing::{info, warn};

use crate::domain::{AttemptOutcome, JobStatus};
use crate::orchestrator::Phase;

/// Span every event of one job is recorded under.
///
/// Attach with [`tracing::Instrument::instrument`]; the job future may hop
/// threads, so the span is not entered directly.
pub fn job_span(job_id: &str, source_name: &str) -> tracing::Span {
    tracing::info_span!("transmigrate.job", job_id = %job_id, source = %source_name)
}

/// Emit event: job started.
pub fn emit_job_started(job_id: &str, source_name: &str, max_attempts: u32) {
    info!(
        event = "job.started",
        job_id = %job_id,
        source = %source_name,
        max_attempts = max_attempts,
    );
}

/// Emit event: an attempt entered a new phase of the state machine.
pub fn emit_phase(attempt: u32, phase: Phase) {
    info!(event = "attempt.phase", attempt = attempt, phase = phase.as_str());
}

/// Emit event: an attempt was finalized and recorded.
pub fn emit_attempt_finished(attempt: u32, outcome: AttemptOutcome, duration_ms: u64) {
    info!(
        event = "attempt.finished",
        attempt = attempt,
        outcome = outcome.as_str(),
        duration_ms = duration_ms,
    );
}

/// Emit event: a transient oracle error is being retried.
pub fn emit_oracle_retry(attempt: u32, call: u32, delay_ms: u64, error: &str) {
    warn!(
        event = "oracle.retry",
        attempt = attempt,
        call = call,
        delay_ms = delay_ms,
        error = %error,
    );
}

/// Emit event: job reached a terminal status.
pub fn emit_job_finished(job_id: &str, status: &JobStatus, attempts: usize, duration_ms: u64) {
    info!(
        event = "job.finished",
        job_id = %job_id,
        status = status.label(),
        attempts = attempts,
        duration_ms = duration_ms,
    );
}

/// Emit event: persisting the audit trail failed (warning level).
pub fn emit_persist_error(job_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "job.persist_error", job_id = %job_id, error = %error);
}
