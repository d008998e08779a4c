//! transmigrate verify - differential verification of candidate translations
//!
//! Provides the Differential Verifier that:
//! - Builds the candidate binary and runs both programs under identical conditions
//! - Probes serving programs over HTTP, one server at a time
//! - Judges each critical-difference category into a verification report

pub mod categories;
pub mod http;
pub mod launcher;
pub mod observation;
pub mod process;
pub mod verifier;

// Re-export key types
pub use categories::{CategoryHandler, EvaluationContext, HandlerRegistry};
pub use http::HttpProbe;
pub use launcher::{CandidateLauncher, CargoLauncher, FixedLauncher, WORKSPACE_PLACEHOLDER};
pub use observation::{
    HttpResponse, ObservationError, Observations, Observed, Probe, ProgramObservations,
};
pub use process::{run_once, Execution, ServerGuard};
pub use verifier::DifferentialVerifier;
