//! transmigrate build - compiler and lint stages for candidate translations
//!
//! Provides the Build Runner that:
//! - Executes cargo check and clippy inside an attempt workspace
//! - Normalizes cargo JSON and rustc text output into diagnostics
//! - Applies the lint policy to decide the build verdict

pub mod artifact;
pub mod diagnostics;
pub mod gate;
pub mod pipeline;
pub mod runner;
pub mod stage;

// Re-export key types
pub use artifact::executable_from;
pub use diagnostics::{dedupe_against, parse_cargo_json, parse_human, stage_diagnostics};
pub use gate::{BuildGate, GateVerdict};
pub use pipeline::BuildRunner;
pub use runner::{StageResult, StageRunner};
pub use stage::{BuiltinStage, StageConfig, StageRole};
