//! Turning a built candidate workspace into a runnable command line.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};
use transmigrate_build::{executable_from, StageConfig, StageRole, StageRunner};
use transmigrate_core::workspace::AttemptWorkspace;

/// Replaced by the attempt workspace path in [`FixedLauncher`] commands.
pub const WORKSPACE_PLACEHOLDER: &str = "{workspace}";

/// Produces the argv that runs the candidate.
#[async_trait]
pub trait CandidateLauncher: Send + Sync {
    /// `Err` explains why the candidate cannot be run; every probe of the
    /// candidate then counts as an execution error.
    async fn prepare(&self, workspace: &AttemptWorkspace) -> Result<Vec<String>, String>;
}

/// Builds a release binary with cargo and runs it directly.
#[derive(Debug, Clone)]
pub struct CargoLauncher {
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl CargoLauncher {
    pub fn new(command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            command,
            timeout_secs,
        }
    }

    async fn build(&self, dir: &Path) -> Result<Vec<String>, String> {
        let stage = StageConfig::custom(
            "candidate_build".to_string(),
            self.command.clone(),
            StageRole::Compile,
            self.timeout_secs,
        );
        let result = StageRunner::execute_stage(&stage, dir).await;
        if !result.passed() {
            let reason = match (&result.spawn_error, result.timed_out) {
                (Some(e), _) => e.clone(),
                (None, true) => format!("timed out after {}s", self.timeout_secs),
                (None, false) => result.output_tail(10),
            };
            return Err(format!("candidate build failed: {}", reason));
        }

        let exe = executable_from(&result.stdout, None)
            .ok_or_else(|| "candidate build produced no binary".to_string())?;
        info!(executable = %exe.display(), duration_ms = result.duration_ms, "candidate built");
        Ok(vec![exe.display().to_string()])
    }
}

#[async_trait]
impl CandidateLauncher for CargoLauncher {
    async fn prepare(&self, workspace: &AttemptWorkspace) -> Result<Vec<String>, String> {
        self.build(workspace.path()).await
    }
}

/// A fixed command line, for candidates that need no separate build step.
#[derive(Debug, Clone)]
pub struct FixedLauncher {
    pub argv: Vec<String>,
}

impl FixedLauncher {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl CandidateLauncher for FixedLauncher {
    async fn prepare(&self, workspace: &AttemptWorkspace) -> Result<Vec<String>, String> {
        if self.argv.is_empty() {
            return Err("no candidate command configured".to_string());
        }
        let root = workspace.path().display().to_string();
        let argv: Vec<String> = self
            .argv
            .iter()
            .map(|part| part.replace(WORKSPACE_PLACEHOLDER, &root))
            .collect();
        debug!(argv = ?argv, "fixed candidate command");
        Ok(argv)
    }
}
