//! Domain models for transmigrate.
//!
//! Canonical definitions for the core entities:
//! - `TranslationContext` / `Candidate`: oracle input and output
//! - `BuildReport` / `VerificationReport`: what the stages found
//! - `Attempt`: one finalized generate-build-verify cycle
//! - `JobResult`: terminal status plus the ledger

pub mod attempt;
pub mod candidate;
pub mod diagnostic;
pub mod error;
pub mod job;
pub mod report;

pub use attempt::{Attempt, AttemptOutcome, AttemptSummary, AttemptUsage};
pub use candidate::{
    Candidate, FeedbackItem, FeedbackKind, OracleUsage, OriginalProgram, TranslationContext,
    REQUIRED_FILES, TARGET_LANGUAGE,
};
pub use diagnostic::{Diagnostic, DiagnosticSource, Severity, SourceLocation};
pub use error::{ConfigError, LedgerError, MigrationError, Result, StageError};
pub use job::{AbortReason, JobResult, JobStatus, JobSummary};
pub use report::{
    BuildReport, BuildVerdict, CategoryResult, CategoryVerdict, StageRecord, VerificationReport,
};
