//! transmigrate core library
//!
//! Domain model, critical-difference rules, attempt ledger and the repair
//! orchestrator that drives generate-build-verify-repair attempts.
//! Concrete build and verify stages live in `transmigrate-build` and
//! `transmigrate-verify`.

pub mod batch;
pub mod cancel;
pub mod config;
pub mod domain;
pub mod feedback;
pub mod ledger;
pub mod obs;
pub mod oracle;
pub mod orchestrator;
pub mod rules;
pub mod stages;
pub mod store;
pub mod telemetry;
pub mod workspace;

pub use batch::{all_accepted, run_jobs};
pub use cancel::CancellationToken;
pub use config::{BuildConfig, MigrationConfig, OracleConfig, ServerConfig, VerifyConfig};
pub use domain::{
    AbortReason, Attempt, AttemptOutcome, AttemptSummary, AttemptUsage, BuildReport, BuildVerdict,
    Candidate, CategoryResult, CategoryVerdict, ConfigError, Diagnostic, DiagnosticSource,
    FeedbackItem, FeedbackKind, JobResult, JobStatus, JobSummary, LedgerError, MigrationError,
    OracleUsage, OriginalProgram, Result, Severity, SourceLocation, StageError, StageRecord,
    TranslationContext, VerificationReport,
};
pub use ledger::Ledger;
pub use oracle::{
    translate_with_retry, HttpOracle, OracleError, OracleFailure, Pricing, RetryPolicy,
    TranslationOracle,
};
pub use orchestrator::{MigrationJob, Orchestrator, Phase};
pub use rules::{
    resolve_rules, ArtifactSource, Category, CategoryParams, CategoryRule, CoreParams,
    DataArtifact, DataParams, EndpointRule, ExecutionCase, ImageParams, LintPolicy,
    ResolvedEndpoint, RoutingParams, RuleLayer, RuleSet, RuleSources, TemplateParams,
};
pub use stages::{BuildStage, VerifyStage};
pub use store::LedgerStore;
pub use workspace::AttemptWorkspace;
