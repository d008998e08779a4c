//! Append-only attempt ledger for one migration job.
//!
//! Invariants enforced on every append:
//! - attempt indices are exactly `1..=k` with no gaps
//! - at most one attempt has outcome `Succeeded`, and it is the last one

use serde::Serialize;

use crate::domain::{Attempt, LedgerError};

/// Ordered, append-only sequence of finalized attempts.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(transparent)]
pub struct Ledger {
    attempts: Vec<Attempt>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted attempts, re-checking every invariant.
    pub fn from_attempts(attempts: Vec<Attempt>) -> Result<Self, LedgerError> {
        let mut ledger = Self::new();
        for attempt in attempts {
            ledger.append(attempt)?;
        }
        Ok(ledger)
    }

    /// Index the next appended attempt must carry.
    pub fn next_index(&self) -> u32 {
        self.attempts.len() as u32 + 1
    }

    pub fn append(&mut self, attempt: Attempt) -> Result<(), LedgerError> {
        if let Some(last) = self.attempts.last() {
            if last.succeeded() {
                return Err(LedgerError::AppendAfterSuccess {
                    index: attempt.index,
                });
            }
        }
        let expected = self.next_index();
        if attempt.index != expected {
            return Err(LedgerError::OutOfOrder {
                expected,
                actual: attempt.index,
            });
        }
        self.attempts.push(attempt);
        Ok(())
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    /// Attempt by 1-based index.
    pub fn get(&self, index: u32) -> Option<&Attempt> {
        index
            .checked_sub(1)
            .and_then(|i| self.attempts.get(i as usize))
    }

    pub fn last(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// The accepted attempt, if any.
    pub fn succeeded(&self) -> Option<&Attempt> {
        self.attempts.last().filter(|a| a.succeeded())
    }
}
