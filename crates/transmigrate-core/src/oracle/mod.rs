//! Translation oracle boundary.
//!
//! The oracle is a black box: given a [`TranslationContext`] it returns a
//! [`Candidate`] or an [`OracleError`]. Transient errors are retried here with
//! exponential backoff, separately from migration attempts.

pub mod extract;
pub mod http;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Candidate, TranslationContext};
use crate::obs;

pub use http::{HttpOracle, Pricing};

/// Error returned by a single oracle call.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum OracleError {
    /// Retryable: transport failure, timeout, rate limit, server error.
    #[error("transient oracle error: {0}")]
    Transient(String),

    /// Not retryable: the job is aborted.
    #[error("fatal oracle error: {0}")]
    Fatal(String),
}

/// Generates candidate translations.
#[async_trait]
pub trait TranslationOracle: Send + Sync {
    async fn translate(&self, ctx: &TranslationContext) -> Result<Candidate, OracleError>;
}

/// Upper bound on a single backoff delay.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Retry policy for transient oracle errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first call (0 = single call).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
    /// Wall-clock limit for one call (milliseconds).
    pub call_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            call_timeout_ms: 120_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), capped at [`MAX_BACKOFF_MS`].
    pub fn backoff_ms(&self, retry: u32) -> u64 {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        self.backoff_base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
    }
}

/// Terminal failure of [`translate_with_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleFailure {
    /// Transient errors outlasted the retry budget.
    Unavailable { calls: u32, last_error: String },
    Fatal(String),
}

/// Call the oracle, retrying transient failures with exponential backoff.
///
/// The returned candidate's usage reports the number of calls made and the
/// total wall time spent, retries and backoff included.
pub async fn translate_with_retry(
    oracle: &dyn TranslationOracle,
    ctx: &TranslationContext,
    policy: &RetryPolicy,
) -> Result<Candidate, OracleFailure> {
    let max_calls = policy.max_retries.saturating_add(1);
    let started = Instant::now();
    let timeout = Duration::from_millis(policy.call_timeout_ms);

    for call in 1..=max_calls {
        let result = match tokio::time::timeout(timeout, oracle.translate(ctx)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(OracleError::Transient(format!(
                "oracle call timed out after {}ms",
                policy.call_timeout_ms
            ))),
        };

        match result {
            Ok(mut candidate) => {
                candidate.usage.calls = call;
                candidate.usage.latency_ms = started.elapsed().as_millis() as u64;
                return Ok(candidate);
            }
            Err(OracleError::Fatal(message)) => return Err(OracleFailure::Fatal(message)),
            Err(OracleError::Transient(message)) => {
                if call == max_calls {
                    return Err(OracleFailure::Unavailable {
                        calls: call,
                        last_error: message,
                    });
                }
                let delay = policy.backoff_ms(call);
                obs::emit_oracle_retry(ctx.attempt, call, delay, &message);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }
    }

    // max_calls >= 1, so the loop always returns.
    Err(OracleFailure::Unavailable {
        calls: max_calls,
        last_error: "exhausted all calls".into(),
    })
}
