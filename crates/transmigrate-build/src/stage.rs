//! Build stage definitions and configuration.

use serde::{Deserialize, Serialize};

/// Builtin build stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinStage {
    /// cargo check --message-format=json
    CargoCheck,

    /// cargo clippy --message-format=json -- -D warnings
    CargoClippy,

    /// cargo build --release --message-format=json
    CargoBuild,
}

impl BuiltinStage {
    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinStage::CargoCheck => "cargo_check",
            BuiltinStage::CargoClippy => "cargo_clippy",
            BuiltinStage::CargoBuild => "cargo_build",
        }
    }

    /// Get the stage's default command.
    pub fn command(&self) -> Vec<String> {
        let argv: &[&str] = match self {
            BuiltinStage::CargoCheck => &["cargo", "check", "--message-format=json"],
            BuiltinStage::CargoClippy => &[
                "cargo",
                "clippy",
                "--message-format=json",
                "--",
                "-D",
                "warnings",
            ],
            BuiltinStage::CargoBuild => &["cargo", "build", "--release", "--message-format=json"],
        };
        argv.iter().map(|s| s.to_string()).collect()
    }

    pub fn role(&self) -> StageRole {
        match self {
            BuiltinStage::CargoClippy => StageRole::Lint,
            BuiltinStage::CargoCheck | BuiltinStage::CargoBuild => StageRole::Compile,
        }
    }
}

/// How a failing stage affects the build verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    /// Failure always fails the build.
    Compile,

    /// Failure fails the build only under a blocking lint policy.
    Lint,
}

/// Configuration for a build stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Human-readable stage name.
    pub name: String,

    /// Command to execute (first element is executable).
    pub command: Vec<String>,

    pub role: StageRole,

    /// Timeout in seconds (0 = unbounded).
    pub timeout_secs: u64,

    /// Whether this stage is enabled.
    pub enabled: bool,
}

impl StageConfig {
    /// Create a new stage configuration from a builtin stage.
    pub fn from_builtin(stage: BuiltinStage, timeout_secs: u64) -> Self {
        Self {
            name: stage.name().to_string(),
            command: stage.command(),
            role: stage.role(),
            timeout_secs,
            enabled: true,
        }
    }

    /// Create a custom stage configuration.
    pub fn custom(name: String, command: Vec<String>, role: StageRole, timeout_secs: u64) -> Self {
        Self {
            name,
            command,
            role,
            timeout_secs,
            enabled: true,
        }
    }

    /// Replace the command, keeping name and role.
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    /// Disable this stage.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Command line as one string, for logs and reports.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}
