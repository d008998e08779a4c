//! Differential Verifier: observe both programs, then judge each category.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use transmigrate_core::config::{ServerConfig, VerifyConfig};
use transmigrate_core::domain::{BuildReport, OriginalProgram, StageError, VerificationReport};
use transmigrate_core::rules::RuleSet;
use transmigrate_core::stages::VerifyStage;
use transmigrate_core::workspace::AttemptWorkspace;

use crate::categories::{EvaluationContext, HandlerRegistry};
use crate::http::HttpProbe;
use crate::launcher::{CandidateLauncher, CargoLauncher};
use crate::observation::{ObservationError, Observations, Observed, Probe, ProgramObservations};
use crate::process::{run_once, ServerGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Original,
    Candidate,
}

impl Side {
    fn label(self) -> &'static str {
        match self {
            Side::Original => "original",
            Side::Candidate => "candidate",
        }
    }
}

/// Runs the original and the candidate under identical conditions and
/// compares them per critical-difference category.
pub struct DifferentialVerifier {
    config: VerifyConfig,
    launcher: Arc<dyn CandidateLauncher>,
    registry: HandlerRegistry,
    /// Held while a server is up; all servers share the configured address.
    server_slot: Mutex<()>,
}

impl DifferentialVerifier {
    /// Verifier that builds candidates with `config.candidate_build_command`.
    pub fn new(config: VerifyConfig) -> Self {
        let launcher = Arc::new(CargoLauncher::new(
            config.candidate_build_command.clone(),
            config.candidate_build_timeout_secs,
        ));
        Self {
            config,
            launcher,
            registry: HandlerRegistry::builtin(),
            server_slot: Mutex::new(()),
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn CandidateLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Compare `candidate_argv` against `original_argv` under `rules`.
    ///
    /// `candidate_argv` is `Err` when the candidate could not be prepared;
    /// every category that needs a candidate observation then reports an
    /// execution error.
    pub async fn verify_programs(
        &self,
        original_argv: &[String],
        candidate_argv: Result<Vec<String>, String>,
        rules: &RuleSet,
        build: &BuildReport,
    ) -> VerificationReport {
        let probes = self.registry.probes(rules);
        let start = Instant::now();

        let original = self.observe(Side::Original, original_argv, &probes).await;
        let candidate = match candidate_argv {
            Ok(argv) => self.observe(Side::Candidate, &argv, &probes).await,
            Err(reason) => {
                warn!(reason = %reason, "candidate cannot be run");
                let mut failed = ProgramObservations::new();
                failed.fail_all(&probes, &ObservationError::Spawn(reason));
                failed
            }
        };
        let observations = Observations {
            original,
            candidate,
        };

        let report = self.evaluate(rules, &observations, build);
        info!(
            passed = report.passed(),
            categories = report.results.len(),
            probes = probes.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "verification finished"
        );
        report
    }

    /// Judge every category present in `rules`.
    pub fn evaluate(
        &self,
        rules: &RuleSet,
        observations: &Observations,
        build: &BuildReport,
    ) -> VerificationReport {
        let ctx = EvaluationContext {
            observations,
            rules,
            build,
        };
        let mut report = VerificationReport::new();
        for rule in rules.rules() {
            let Some(handler) = self.registry.get(rule.category()) else {
                continue;
            };
            let result = handler.evaluate(rule, &ctx);
            debug!(
                category = ?result.category,
                verdict = ?result.verdict,
                explanation = %result.explanation,
                "category evaluated"
            );
            report.insert(result);
        }
        report
    }

    async fn observe(&self, side: Side, argv: &[String], probes: &[Probe]) -> ProgramObservations {
        let mut observations = ProgramObservations::new();
        let timeout = Duration::from_secs(self.config.exec_timeout_secs);

        for probe in probes {
            if let Probe::Run { case, file } = probe {
                let result = run_once(argv, case, timeout, file.as_deref()).await;
                if let Err(e) = &result {
                    warn!(program = side.label(), probe = %probe.label(), error = %e, "run failed");
                }
                observations.record(probe.clone(), result.map(Observed::Output));
            }
        }

        let http: Vec<&Probe> = probes.iter().filter(|p| p.is_http()).collect();
        if !http.is_empty() {
            match &self.config.server {
                Some(server) => {
                    self.observe_server(side, argv, server, &http, &mut observations)
                        .await
                }
                None => observations.fail_all(
                    http.iter().copied(),
                    &ObservationError::NotConfigured(
                        "HTTP endpoints need verify.server".to_string(),
                    ),
                ),
            }
        }
        observations
    }

    async fn observe_server(
        &self,
        side: Side,
        argv: &[String],
        server: &ServerConfig,
        probes: &[&Probe],
        observations: &mut ProgramObservations,
    ) {
        let _slot = self.server_slot.lock().await;
        let external = side == Side::Original && server.original_external;
        let base_url = match side {
            Side::Original => server.original_base_url(),
            Side::Candidate => server.base_url(),
        };

        let client = match HttpProbe::new(
            base_url,
            Duration::from_secs(server.request_timeout_secs),
        ) {
            Ok(client) => client,
            Err(e) => return observations.fail_all(probes.iter().copied(), &e),
        };

        let mut guard = if external {
            None
        } else {
            match ServerGuard::launch(argv, side.label()) {
                Ok(guard) => Some(guard),
                Err(e) => return observations.fail_all(probes.iter().copied(), &e),
            }
        };

        let ready = client
            .wait_ready(
                guard.as_mut(),
                &server.ready_path,
                Duration::from_secs(server.startup_timeout_secs),
            )
            .await;
        match ready {
            Ok(()) => {
                for probe in probes {
                    if let Probe::Http(endpoint) = probe {
                        let result = client.request(endpoint).await;
                        observations.record((*probe).clone(), result.map(Observed::Response));
                    }
                }
            }
            Err(e) => {
                warn!(program = side.label(), error = %e, "server never became ready");
                observations.fail_all(probes.iter().copied(), &e);
            }
        }

        if let Some(guard) = guard {
            guard.shutdown().await;
        }
    }
}

#[async_trait]
impl VerifyStage for DifferentialVerifier {
    async fn verify(
        &self,
        original: &OriginalProgram,
        workspace: &AttemptWorkspace,
        rules: &RuleSet,
        build: &BuildReport,
    ) -> Result<VerificationReport, StageError> {
        let source = std::fs::canonicalize(&original.path)?;
        let original_argv = self.config.original_argv(&source);

        let candidate_argv = if self.registry.probes(rules).is_empty() {
            Ok(Vec::new())
        } else {
            self.launcher.prepare(workspace).await
        };

        Ok(self
            .verify_programs(&original_argv, candidate_argv, rules, build)
            .await)
    }
}
