//! Job configuration.
//!
//! [`MigrationConfig`] is an immutable value built once (defaults, then an
//! optional JSON file, then CLI overrides) and shared by every job.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::oracle::{Pricing, RetryPolicy};

/// Placeholder in `verify.original_command` replaced by the source path.
pub const SOURCE_PLACEHOLDER: &str = "{source}";

/// Largest accepted `oracle.retry.max_retries`.
pub const MAX_ORACLE_RETRIES: u32 = 20;

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Translation oracle settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    pub endpoint: Option<String>,
    /// Bearer token; usually supplied via `TRANSMIGRATE_ORACLE_TOKEN`.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub retry: RetryPolicy,
    pub pricing: Pricing,
}

/// Build Runner settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildConfig {
    /// Compiler in check-only mode.
    pub check_command: Vec<String>,
    /// Lint pass; `None` disables it.
    pub lint_command: Option<Vec<String>>,
    /// Per-stage timeout.
    pub timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            check_command: argv(&["cargo", "check", "--message-format=json"]),
            lint_command: Some(argv(&[
                "cargo",
                "clippy",
                "--message-format=json",
                "--",
                "-D",
                "warnings",
            ])),
            timeout_secs: 300,
        }
    }
}

/// Address and timing of a network-serving program under verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` both programs listen on, one at a time.
    pub address: String,
    /// Polled until any HTTP response arrives.
    pub ready_path: String,
    pub startup_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Original program is already running at `original_address`; it is not launched.
    pub original_external: bool,
    /// Address of an externally managed original; defaults to `address`.
    pub original_address: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            ready_path: "/".to_string(),
            startup_timeout_secs: 60,
            request_timeout_secs: 30,
            original_external: false,
            original_address: None,
        }
    }
}

impl ServerConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.address)
    }

    pub fn original_base_url(&self) -> String {
        format!(
            "http://{}",
            self.original_address.as_deref().unwrap_or(&self.address)
        )
    }
}

/// Differential Verifier settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VerifyConfig {
    /// Wall-clock limit for one program execution.
    pub exec_timeout_secs: u64,
    /// Set when the programs serve HTTP instead of running to completion.
    pub server: Option<ServerConfig>,
    /// Produces the candidate executable inside the attempt workspace.
    pub candidate_build_command: Vec<String>,
    /// Timeout for `candidate_build_command`.
    pub candidate_build_timeout_secs: u64,
    /// Launches the original; `{source}` is replaced by the source path.
    pub original_command: Vec<String>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            exec_timeout_secs: 30,
            server: None,
            candidate_build_command: argv(&[
                "cargo",
                "build",
                "--release",
                "--message-format=json",
            ]),
            candidate_build_timeout_secs: 600,
            original_command: argv(&["python3", SOURCE_PLACEHOLDER]),
        }
    }
}

impl VerifyConfig {
    /// `original_command` with the source path substituted.
    pub fn original_argv(&self, source: &Path) -> Vec<String> {
        let source = source.display().to_string();
        self.original_command
            .iter()
            .map(|part| part.replace(SOURCE_PLACEHOLDER, &source))
            .collect()
    }
}

/// Top-level configuration shared by every job of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MigrationConfig {
    /// Migration attempts per job.
    pub max_attempts: u32,
    /// Overall wall clock per job; unlimited when `None`.
    pub job_timeout_secs: Option<u64>,
    /// Parent directory for attempt workspaces; system temp dir when `None`.
    pub workspace_root: Option<PathBuf>,
    pub oracle: OracleConfig,
    pub build: BuildConfig,
    pub verify: VerifyConfig,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            job_timeout_secs: None,
            workspace_root: None,
            oracle: OracleConfig::default(),
            build: BuildConfig::default(),
            verify: VerifyConfig::default(),
        }
    }
}

impl MigrationConfig {
    /// Load a JSON config file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| {
            ConfigError::Invalid(format!("{}: {}", path.display(), e))
        })
    }

    /// Reject configurations no job could run under.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::InvalidMaxAttempts(self.max_attempts));
        }
        if self.oracle.retry.max_retries > MAX_ORACLE_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "oracle.retry.max_retries must be at most {}, got {}",
                MAX_ORACLE_RETRIES, self.oracle.retry.max_retries
            )));
        }
        if self.build.check_command.is_empty() {
            return Err(ConfigError::Invalid("build.check_command is empty".into()));
        }
        if matches!(&self.build.lint_command, Some(cmd) if cmd.is_empty()) {
            return Err(ConfigError::Invalid("build.lint_command is empty".into()));
        }
        if self.verify.candidate_build_command.is_empty() {
            return Err(ConfigError::Invalid(
                "verify.candidate_build_command is empty".into(),
            ));
        }
        let original_external = matches!(&self.verify.server, Some(s) if s.original_external);
        if self.verify.original_command.is_empty() && !original_external {
            return Err(ConfigError::Invalid(
                "verify.original_command is empty".into(),
            ));
        }
        Ok(())
    }
}
