//! What a program was asked to do and what it produced.

use std::collections::BTreeMap;

use transmigrate_core::rules::{ArtifactSource, ExecutionCase, ResolvedEndpoint};

use crate::process::Execution;

/// Why an observation could not be made.
///
/// Any of these turns the dependent category into an `ExecutionError`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObservationError {
    #[error("failed to start: {0}")]
    Spawn(String),

    #[error("timed out after {secs}s")]
    TimedOut { secs: u64 },

    #[error("crashed: {0}")]
    Crashed(String),

    #[error("did not write expected file `{0}`")]
    MissingFile(String),

    #[error("server not ready: {0}")]
    NotReady(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("not configured: {0}")]
    NotConfigured(String),
}

/// One thing to observe on both programs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Probe {
    /// One-shot run; `file` selects an output file instead of stdout.
    Run {
        case: ExecutionCase,
        file: Option<String>,
    },

    /// HTTP request to the serving program.
    Http(ResolvedEndpoint),
}

impl Probe {
    pub fn run(case: ExecutionCase) -> Self {
        Probe::Run { case, file: None }
    }

    /// Probe for an artifact source; `None` if the endpoint cannot be resolved.
    pub fn for_source(source: &ArtifactSource) -> Option<Self> {
        match source {
            ArtifactSource::Endpoint(endpoint) => endpoint.resolve().ok().map(Probe::Http),
            ArtifactSource::Run { args, stdin, file } => Some(Probe::Run {
                case: ExecutionCase {
                    args: args.clone(),
                    stdin: stdin.clone(),
                },
                file: file.clone(),
            }),
        }
    }

    pub fn is_http(&self) -> bool {
        matches!(self, Probe::Http(_))
    }

    pub fn label(&self) -> String {
        match self {
            Probe::Run { case, file: None } => format!("run {}", case.label()),
            Probe::Run {
                case,
                file: Some(file),
            } => format!("file `{}` of run {}", file, case.label()),
            Probe::Http(endpoint) => endpoint.to_string(),
        }
    }
}

/// An HTTP response as observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Result of one probe.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Output(Execution),
    Response(HttpResponse),
}

impl Observed {
    /// Bytes an artifact comparison looks at: the captured file, stdout, or
    /// the response body.
    pub fn artifact_bytes(&self) -> &[u8] {
        match self {
            Observed::Output(exec) => exec.file.as_deref().unwrap_or(&exec.stdout),
            Observed::Response(resp) => &resp.body,
        }
    }

    pub fn artifact_text(&self) -> String {
        String::from_utf8_lossy(self.artifact_bytes()).into_owned()
    }
}

/// All observations of one program.
#[derive(Debug, Clone, Default)]
pub struct ProgramObservations {
    results: BTreeMap<Probe, Result<Observed, ObservationError>>,
}

impl ProgramObservations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, probe: Probe, result: Result<Observed, ObservationError>) {
        self.results.insert(probe, result);
    }

    /// Record the same failure for every probe in `probes`.
    pub fn fail_all<'a>(
        &mut self,
        probes: impl IntoIterator<Item = &'a Probe>,
        error: &ObservationError,
    ) {
        for probe in probes {
            self.results.insert(probe.clone(), Err(error.clone()));
        }
    }

    pub fn get(&self, probe: &Probe) -> Result<&Observed, ObservationError> {
        match self.results.get(probe) {
            Some(Ok(observed)) => Ok(observed),
            Some(Err(e)) => Err(e.clone()),
            None => Err(ObservationError::NotConfigured(format!(
                "{} was never observed",
                probe.label()
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Observations of both programs, the input to every category handler.
#[derive(Debug, Clone, Default)]
pub struct Observations {
    pub original: ProgramObservations,
    pub candidate: ProgramObservations,
}

impl Observations {
    /// Both sides of `probe`, or an explanation naming the side that failed.
    pub fn pair(&self, probe: &Probe) -> Result<(&Observed, &Observed), String> {
        let original = self
            .original
            .get(probe)
            .map_err(|e| format!("{}: original program {}", probe.label(), e))?;
        let candidate = self
            .candidate
            .get(probe)
            .map_err(|e| format!("{}: candidate program {}", probe.label(), e))?;
        Ok((original, candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transmigrate_core::rules::EndpointRule;

    fn output(stdout: &str) -> Observed {
        Observed::Output(Execution {
            exit_code: Some(0),
            stdout: stdout.as_bytes().to_vec(),
            stderr: String::new(),
            duration_ms: 1,
            file: None,
        })
    }

    #[test]
    fn test_probe_for_source() {
        let source = ArtifactSource::Endpoint(
            EndpointRule::new("get", "/primes/<n>").with_param("n", "10"),
        );
        let probe = Probe::for_source(&source).expect("probe");
        assert!(probe.is_http());
        assert_eq!(probe.label(), "GET /primes/10");

        let source = ArtifactSource::Run {
            args: vec!["4".into()],
            stdin: None,
            file: Some("out.png".into()),
        };
        let probe = Probe::for_source(&source).expect("probe");
        assert!(!probe.is_http());
        assert!(probe.label().contains("out.png"));
    }

    #[test]
    fn test_pair_names_failing_side() {
        let probe = Probe::run(ExecutionCase::default());
        let mut obs = Observations::default();
        obs.original.record(probe.clone(), Ok(output("24\n")));
        obs.candidate
            .record(probe.clone(), Err(ObservationError::TimedOut { secs: 30 }));

        let err = obs.pair(&probe).expect_err("candidate failed");
        assert!(err.contains("candidate program timed out after 30s"));

        let missing = Probe::run(ExecutionCase::with_args(["9"]));
        assert!(obs.pair(&missing).is_err());
    }

    #[test]
    fn test_artifact_bytes_prefers_file() {
        let observed = Observed::Output(Execution {
            exit_code: Some(0),
            stdout: b"log line".to_vec(),
            stderr: String::new(),
            duration_ms: 1,
            file: Some(b"payload".to_vec()),
        });
        assert_eq!(observed.artifact_bytes(), b"payload");
        assert_eq!(output("x").artifact_text(), "x");
    }
}
