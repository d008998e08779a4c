//! Build stage execution.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, warn};
use transmigrate_core::domain::StageRecord;

use crate::stage::StageConfig;

/// Result of a stage execution.
#[derive(Debug, Clone)]
pub struct StageResult {
    /// Stage name.
    pub stage_name: String,

    /// Command line as executed.
    pub command: String,

    /// Exit code (None if killed, timed out or never started).
    pub exit_code: Option<i32>,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether execution succeeded.
    pub success: bool,

    pub timed_out: bool,

    /// Why the process could not be started.
    pub spawn_error: Option<String>,
}

impl StageResult {
    /// Whether this stage passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == Some(0)
    }

    fn failed(config: &StageConfig, start: Instant) -> Self {
        Self {
            stage_name: config.name.clone(),
            command: config.command_line(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: start.elapsed().as_millis() as u64,
            success: false,
            timed_out: false,
            spawn_error: None,
        }
    }

    /// Last `max_lines` lines of stderr followed by stdout.
    pub fn output_tail(&self, max_lines: usize) -> String {
        let combined = format!("{}\n{}", self.stderr.trim_end(), self.stdout.trim_end());
        let lines: Vec<&str> = combined.trim().lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }

    pub fn to_record(&self, blocking: bool) -> StageRecord {
        StageRecord {
            name: self.stage_name.clone(),
            command: self.command.clone(),
            exit_code: self.exit_code,
            duration_ms: self.duration_ms,
            success: self.passed(),
            blocking,
            timed_out: self.timed_out,
            stdout: self.stdout.clone(),
            stderr: match &self.spawn_error {
                Some(e) if self.stderr.is_empty() => e.clone(),
                _ => self.stderr.clone(),
            },
        }
    }
}

/// Runs build stages inside a candidate workspace.
pub struct StageRunner;

impl StageRunner {
    /// Execute a single stage in `cwd` and return the result.
    ///
    /// Spawn failures and timeouts are reported as failing results, never as
    /// errors. The child is killed if the returned future is dropped.
    pub async fn execute_stage(config: &StageConfig, cwd: &Path) -> StageResult {
        let start = Instant::now();

        if config.command.is_empty() {
            let mut result = StageResult::failed(config, start);
            result.spawn_error = Some(format!("stage {} has empty command", config.name));
            return result;
        }

        let exe = &config.command[0];
        let args = &config.command[1..];

        let child = match Command::new(exe)
            .args(args)
            .current_dir(cwd)
            .env("CARGO_TERM_COLOR", "never")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(stage = %config.name, error = %e, "failed to spawn stage");
                let mut result = StageResult::failed(config, start);
                result.spawn_error = Some(format!("failed to spawn `{}`: {}", exe, e));
                return result;
            }
        };

        let output = if config.timeout_secs > 0 {
            match tokio::time::timeout(
                Duration::from_secs(config.timeout_secs),
                child.wait_with_output(),
            )
            .await
            {
                Ok(output) => output,
                Err(_) => {
                    warn!(
                        stage = %config.name,
                        timeout_secs = config.timeout_secs,
                        "stage timed out"
                    );
                    let mut result = StageResult::failed(config, start);
                    result.timed_out = true;
                    result.stderr = format!(
                        "stage {} timed out after {} seconds",
                        config.name, config.timeout_secs
                    );
                    return result;
                }
            }
        } else {
            child.wait_with_output().await
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                let mut result = StageResult::failed(config, start);
                result.spawn_error = Some(format!("failed to collect output: {}", e));
                return result;
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(stage = %config.name, status = %output.status, duration_ms, "stage finished");

        StageResult {
            stage_name: config.name.clone(),
            command: config.command_line(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
            success: output.status.success(),
            timed_out: false,
            spawn_error: None,
        }
    }
}
