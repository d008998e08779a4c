//! Domain-level error taxonomy for transmigrate.

use std::path::PathBuf;

/// Errors raised while loading or validating configuration and rule documents.
///
/// Always fatal at job start: no attempt is made once one of these surfaces.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("rule document not found: {}", .0.display())]
    MissingRuleDocument(PathBuf),

    #[error("malformed rule document {source_name}: {reason}")]
    MalformedRuleDocument { source_name: String, reason: String },

    #[error("unknown critical-difference category: {0}")]
    UnknownCategory(String),

    #[error("invalid parameters for category {category}: {reason}")]
    InvalidCategory { category: String, reason: String },

    #[error("max_attempts must be at least 1, got {0}")]
    InvalidMaxAttempts(u32),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("io error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the attempt ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("attempt index out of order: expected {expected}, got {actual}")]
    OutOfOrder { expected: u32, actual: u32 },

    #[error("attempt {index} appended after a succeeded attempt")]
    AppendAfterSuccess { index: u32 },

    #[error("ledger digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },
}

/// Infrastructure failure of a build or verify stage.
///
/// Compile errors, lint findings and behavioural mismatches are reported in
/// the stage's report; this is only for a stage that could not run at all.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

/// Top-level errors for a migration job.
///
/// Build and verification failures are not errors: they are attempt outcomes
/// recorded in the ledger. Only conditions that prevent the job from running
/// or from keeping its audit trail surface here.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job task failed: {0}")]
    TaskFailed(String),
}

/// Result type for transmigrate domain operations.
pub type Result<T> = std::result::Result<T, MigrationError>;
