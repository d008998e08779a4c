//! Seams between the orchestrator and the build/verify implementations.

use async_trait::async_trait;

use crate::domain::{BuildReport, OriginalProgram, StageError, VerificationReport};
use crate::rules::RuleSet;
use crate::workspace::AttemptWorkspace;

/// Compiles and lints a materialized candidate.
#[async_trait]
pub trait BuildStage: Send + Sync {
    /// Build failures are reported in the returned report; `Err` means the
    /// stage could not run at all.
    async fn build(
        &self,
        workspace: &AttemptWorkspace,
        rules: &RuleSet,
    ) -> Result<BuildReport, StageError>;
}

/// Compares a built candidate against the original program.
#[async_trait]
pub trait VerifyStage: Send + Sync {
    /// Behavioural mismatches and program crashes are category verdicts in the
    /// returned report; `Err` means verification could not run at all.
    async fn verify(
        &self,
        original: &OriginalProgram,
        workspace: &AttemptWorkspace,
        rules: &RuleSet,
        build: &BuildReport,
    ) -> Result<VerificationReport, StageError>;
}
