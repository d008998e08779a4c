//! Program execution under identical conditions.
//!
//! Every run gets a fresh temporary working directory, a null or scripted
//! stdin, and a wall-clock timeout. Children are killed when their handle
//! is dropped.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};
use transmigrate_core::rules::ExecutionCase;
use transmigrate_core::workspace::safe_relative_path;

use crate::observation::ObservationError;

/// Captured result of a program that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub duration_ms: u64,
    /// Contents of the requested output file, when one was requested.
    pub file: Option<Vec<u8>>,
}

impl Execution {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Last lines of stderr, for explanations.
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        let lines: Vec<&str> = self.stderr.trim_end().lines().collect();
        lines[lines.len().saturating_sub(max_lines)..].join("\n")
    }
}

fn command_for(argv: &[String], cwd: &Path) -> Result<Command, ObservationError> {
    let (exe, args) = argv
        .split_first()
        .ok_or_else(|| ObservationError::Spawn("no command configured".to_string()))?;
    let mut command = Command::new(exe);
    command
        .args(args)
        .current_dir(cwd)
        .env("PYTHONUNBUFFERED", "1")
        .kill_on_drop(true);
    Ok(command)
}

fn scratch_dir() -> Result<TempDir, ObservationError> {
    tempfile::Builder::new()
        .prefix("transmigrate-run-")
        .tempdir()
        .map_err(|e| ObservationError::Spawn(format!("failed to create working directory: {}", e)))
}

/// Run `argv` plus the case arguments to completion.
///
/// `capture` names a file the program is expected to write into its working
/// directory; its contents are returned in [`Execution::file`].
pub async fn run_once(
    argv: &[String],
    case: &ExecutionCase,
    timeout: Duration,
    capture: Option<&str>,
) -> Result<Execution, ObservationError> {
    let dir = scratch_dir()?;
    let mut command = command_for(argv, dir.path())?;
    command
        .args(&case.args)
        .stdin(if case.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let start = Instant::now();
    let mut child = command
        .spawn()
        .map_err(|e| ObservationError::Spawn(format!("`{}`: {}", argv[0], e)))?;

    if let (Some(input), Some(mut stdin)) = (case.stdin.clone(), child.stdin.take()) {
        // Written concurrently with output collection; stdout may fill before stdin drains.
        tokio::spawn(async move {
            // A program that exits without reading stdin closes the pipe; that is not an error.
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                debug!(error = %e, "stdin closed early");
            }
        });
    }

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ObservationError::TimedOut {
            secs: timeout.as_secs(),
        })?
        .map_err(|e| ObservationError::Spawn(format!("failed to collect output: {}", e)))?;

    let duration_ms = start.elapsed().as_millis() as u64;
    if output.status.code().is_none() {
        return Err(ObservationError::Crashed(format!(
            "terminated by a signal: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let file = match capture {
        Some(rel) => {
            let rel_path = safe_relative_path(rel)
                .ok_or_else(|| ObservationError::MissingFile(rel.to_string()))?;
            match std::fs::read(dir.path().join(rel_path)) {
                Ok(bytes) => Some(bytes),
                Err(_) => return Err(ObservationError::MissingFile(rel.to_string())),
            }
        }
        None => None,
    };

    Ok(Execution {
        exit_code: output.status.code(),
        stdout: output.stdout,
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration_ms,
        file,
    })
}

/// A launched server process. Killed on drop; prefer [`ServerGuard::shutdown`]
/// to also reap it.
#[derive(Debug)]
pub struct ServerGuard {
    child: Child,
    label: String,
    _dir: TempDir,
}

impl ServerGuard {
    pub fn launch(argv: &[String], label: &str) -> Result<Self, ObservationError> {
        let dir = scratch_dir()?;
        let mut command = command_for(argv, dir.path())?;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let child = command
            .spawn()
            .map_err(|e| ObservationError::Spawn(format!("`{}`: {}", argv[0], e)))?;
        debug!(server = label, pid = ?child.id(), "server launched");
        Ok(Self {
            child,
            label: label.to_string(),
            _dir: dir,
        })
    }

    /// Exit status if the server has already exited.
    pub fn exited(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Kill the server and wait for it to be reaped.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!(server = %self.label, error = %e, "server already gone");
        }
        if let Err(e) = self.child.wait().await {
            warn!(server = %self.label, error = %e, "failed to reap server");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string(), "sh".to_string()]
    }

    #[tokio::test]
    async fn test_run_once_captures_stdout_and_args() {
        let case = ExecutionCase::with_args(["4"]);
        let exec = run_once(&sh("echo arg=$1"), &case, Duration::from_secs(10), None)
            .await
            .expect("run");
        assert_eq!(exec.exit_code, Some(0));
        assert_eq!(exec.stdout_text(), "arg=4\n");
    }

    #[tokio::test]
    async fn test_run_once_feeds_stdin() {
        let case = ExecutionCase {
            args: Vec::new(),
            stdin: Some("hello\n".to_string()),
        };
        let exec = run_once(&sh("cat"), &case, Duration::from_secs(10), None)
            .await
            .expect("run");
        assert_eq!(exec.stdout_text(), "hello\n");
    }

    #[tokio::test]
    async fn test_run_once_nonzero_exit_is_observation() {
        let exec = run_once(
            &sh("echo oops >&2; exit 2"),
            &ExecutionCase::default(),
            Duration::from_secs(10),
            None,
        )
        .await
        .expect("run");
        assert_eq!(exec.exit_code, Some(2));
        assert_eq!(exec.stderr_tail(5), "oops");
    }

    #[tokio::test]
    async fn test_run_once_timeout() {
        let err = run_once(
            &sh("sleep 30"),
            &ExecutionCase::default(),
            Duration::from_secs(1),
            None,
        )
        .await
        .expect_err("timeout");
        assert_eq!(err, ObservationError::TimedOut { secs: 1 });
    }

    #[tokio::test]
    async fn test_run_once_captures_file() {
        let exec = run_once(
            &sh("printf 'a,b' > out.csv"),
            &ExecutionCase::default(),
            Duration::from_secs(10),
            Some("out.csv"),
        )
        .await
        .expect("run");
        assert_eq!(exec.file.as_deref(), Some(&b"a,b"[..]));

        let err = run_once(
            &sh("true"),
            &ExecutionCase::default(),
            Duration::from_secs(10),
            Some("out.csv"),
        )
        .await
        .expect_err("missing file");
        assert_eq!(err, ObservationError::MissingFile("out.csv".to_string()));
    }

    #[tokio::test]
    async fn test_run_once_missing_program() {
        let err = run_once(
            &["transmigrate-no-such-program".to_string()],
            &ExecutionCase::default(),
            Duration::from_secs(10),
            None,
        )
        .await
        .expect_err("spawn");
        assert!(matches!(err, ObservationError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_server_guard_lifecycle() {
        let mut guard = ServerGuard::launch(&sh("sleep 30"), "test").expect("launch");
        assert!(guard.exited().is_none());
        guard.shutdown().await;

        let mut quick = ServerGuard::launch(&sh("exit 3"), "test").expect("launch");
        let mut status = None;
        for _ in 0..50 {
            status = quick.exited();
            if status.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(status.and_then(|s| s.code()), Some(3));
    }
}
