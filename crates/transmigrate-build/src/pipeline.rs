//! Build pipeline: compiler and lint stages over one candidate workspace.

use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};
use transmigrate_core::config::BuildConfig;
use transmigrate_core::domain::{BuildReport, BuildVerdict, DiagnosticSource, StageError};
use transmigrate_core::rules::{LintPolicy, RuleSet};
use transmigrate_core::stages::BuildStage;
use transmigrate_core::workspace::AttemptWorkspace;

use crate::diagnostics::{dedupe_against, stage_diagnostics};
use crate::gate::BuildGate;
use crate::runner::{StageResult, StageRunner};
use crate::stage::{BuiltinStage, StageConfig, StageRole};

/// Build Runner: runs every enabled stage and folds the results into a
/// [`BuildReport`].
///
/// All stages run even when an earlier one fails, so the report carries
/// lint findings alongside compile errors.
#[derive(Debug, Clone)]
pub struct BuildRunner {
    stages: Vec<StageConfig>,
}

impl BuildRunner {
    pub fn new(stages: Vec<StageConfig>) -> Self {
        Self { stages }
    }

    /// Check stage plus the optional lint stage from configuration.
    pub fn from_config(config: &BuildConfig) -> Self {
        let mut stages = vec![
            StageConfig::from_builtin(BuiltinStage::CargoCheck, config.timeout_secs)
                .with_command(config.check_command.clone()),
        ];
        if let Some(lint) = &config.lint_command {
            stages.push(
                StageConfig::from_builtin(BuiltinStage::CargoClippy, config.timeout_secs)
                    .with_command(lint.clone()),
            );
        }
        Self { stages }
    }

    pub fn stages(&self) -> &[StageConfig] {
        &self.stages
    }

    /// Run all enabled stages in `dir` under `policy`.
    pub async fn run(&self, dir: &Path, policy: LintPolicy) -> BuildReport {
        let start = Instant::now();
        let mut executed: Vec<(StageRole, StageResult)> = Vec::new();
        let mut diagnostics = Vec::new();

        for config in &self.stages {
            if !config.enabled {
                info!(stage = %config.name, "Skipping disabled stage");
                continue;
            }

            info!(stage = %config.name, "Executing stage");
            let result = StageRunner::execute_stage(config, dir).await;

            let source = match config.role {
                StageRole::Compile => DiagnosticSource::Rustc,
                StageRole::Lint => DiagnosticSource::Clippy,
            };
            let found = stage_diagnostics(&result, source);
            let fresh = dedupe_against(&diagnostics, found);
            diagnostics.extend(fresh);

            if !result.passed() {
                warn!(
                    stage = %config.name,
                    exit_code = ?result.exit_code,
                    timed_out = result.timed_out,
                    "stage failed"
                );
            }
            executed.push((config.role, result));
        }

        let verdict = BuildGate::evaluate(&executed, policy);
        info!(
            passed = verdict.passed,
            duration_ms = start.elapsed().as_millis() as u64,
            "{}",
            verdict.message
        );

        let stages = executed
            .iter()
            .map(|(role, result)| {
                let blocking = *role == StageRole::Compile || policy == LintPolicy::Blocking;
                result.to_record(blocking)
            })
            .collect();

        BuildReport {
            verdict: if verdict.passed {
                BuildVerdict::Pass
            } else {
                BuildVerdict::Fail
            },
            diagnostics,
            stages,
            lint_policy: policy,
        }
    }
}

#[async_trait]
impl BuildStage for BuildRunner {
    async fn build(
        &self,
        workspace: &AttemptWorkspace,
        rules: &RuleSet,
    ) -> Result<BuildReport, StageError> {
        if !workspace.path().is_dir() {
            return Err(StageError::Internal(format!(
                "attempt workspace {} does not exist",
                workspace.path().display()
            )));
        }
        Ok(self.run(workspace.path(), rules.lint_policy()).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_defaults() {
        let runner = BuildRunner::from_config(&BuildConfig::default());
        let names: Vec<&str> = runner.stages().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["cargo_check", "cargo_clippy"]);
        assert_eq!(runner.stages()[1].role, StageRole::Lint);
        assert_eq!(runner.stages()[0].timeout_secs, 300);
    }

    #[test]
    fn test_from_config_without_lint() {
        let config = BuildConfig {
            lint_command: None,
            ..BuildConfig::default()
        };
        let runner = BuildRunner::from_config(&config);
        assert_eq!(runner.stages().len(), 1);
    }
}
