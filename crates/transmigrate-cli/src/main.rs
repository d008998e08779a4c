//! transmigrate - oracle-driven Python to Rust migration CLI
//!
//! ## Commands
//!
//! - `migrate`: Translate one or more source files, repairing until verified
//! - `rules`: Print the resolved rule set
//! - `ledger`: Load and verify a persisted job ledger

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn, Level};

use transmigrate_build::BuildRunner;
use transmigrate_core::telemetry::init_tracing;
use transmigrate_core::{
    all_accepted, resolve_rules, run_jobs, CancellationToken, HttpOracle, JobResult, JobStatus,
    LedgerStore, MigrationConfig, MigrationError, MigrationJob, Orchestrator, OriginalProgram,
    RuleSet, RuleSources,
};
use transmigrate_verify::DifferentialVerifier;

#[derive(Parser)]
#[command(name = "transmigrate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Oracle-driven Python to Rust migration", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate source files and repair candidates until they verify
    Migrate(MigrateArgs),

    /// Print the resolved rule set as JSON
    Rules {
        /// Job-level rule document (default: ./migration_rules.json if present)
        #[arg(long, env = "TRANSMIGRATE_RULES")]
        rules: Option<PathBuf>,
    },

    /// Load a persisted job ledger, verify its digest and print its attempts
    Ledger {
        /// Job output directory (contains ledger.json)
        dir: PathBuf,

        /// Print the job summary as JSON instead of a table
        #[arg(long = "as-json")]
        as_json: bool,
    },
}

#[derive(Args, Debug, Clone)]
struct MigrateArgs {
    /// Source files to translate
    #[arg(long = "source", required = true, num_args = 1..)]
    sources: Vec<PathBuf>,

    /// Parent of the per-job output directories
    #[arg(long, default_value = "generated", env = "TRANSMIGRATE_OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Job-level rule document (default: ./migration_rules.json if present)
    #[arg(long, env = "TRANSMIGRATE_RULES")]
    rules: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, env = "TRANSMIGRATE_CONFIG")]
    config: Option<PathBuf>,

    /// Migration attempts per job
    #[arg(long, env = "TRANSMIGRATE_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    /// Oracle service URL
    #[arg(long, env = "TRANSMIGRATE_ORACLE_URL")]
    oracle_url: Option<String>,

    /// Oracle bearer token
    #[arg(long, env = "TRANSMIGRATE_ORACLE_TOKEN", hide_env_values = true)]
    oracle_token: Option<String>,

    /// Command that runs the original program, given after `--`; `{source}` is
    /// replaced by its path
    #[arg(last = true, allow_hyphen_values = true, value_name = "ORIGINAL_CMD")]
    original_cmd: Vec<String>,

    /// Jobs to run concurrently
    #[arg(long, default_value = "1", env = "TRANSMIGRATE_JOBS")]
    jobs: usize,

    /// Overall wall-clock limit per job, in seconds
    #[arg(long, env = "TRANSMIGRATE_JOB_TIMEOUT")]
    job_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Migrate(args) => {
            let accepted = cmd_migrate(&args).await?;
            Ok(if accepted {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Rules { rules } => {
            cmd_rules(rules)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Ledger { dir, as_json } => {
            cmd_ledger(&dir, as_json)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Defaults, then the config file, then flags and environment.
fn load_config(args: &MigrateArgs) -> Result<MigrationConfig> {
    let mut config = match &args.config {
        Some(path) => MigrationConfig::load(path)?,
        None => MigrationConfig::default(),
    };

    if let Some(max_attempts) = args.max_attempts {
        config.max_attempts = max_attempts;
    }
    if let Some(url) = &args.oracle_url {
        config.oracle.endpoint = Some(url.clone());
    }
    if let Some(token) = &args.oracle_token {
        config.oracle.token = Some(token.clone());
    }
    if !args.original_cmd.is_empty() {
        config.verify.original_command = args.original_cmd.clone();
    }
    if let Some(secs) = args.job_timeout {
        config.job_timeout_secs = Some(secs);
    }

    config.validate()?;
    Ok(config)
}

fn resolve(rules: Option<PathBuf>) -> Result<RuleSet> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let rules = resolve_rules(&RuleSources::discover(rules, &cwd))?;
    Ok(rules)
}

/// Output directory per source, keyed by file stem.
fn job_dirs(output_dir: &Path, sources: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut seen = BTreeSet::new();
    sources
        .iter()
        .map(|source| {
            let stem = source
                .file_stem()
                .and_then(|s| s.to_str())
                .with_context(|| format!("Source {:?} has no usable file name", source))?;
            if !seen.insert(stem.to_string()) {
                anyhow::bail!("Two sources share the output directory name '{}'", stem);
            }
            Ok(output_dir.join(stem))
        })
        .collect()
}

fn build_orchestrator(config: &MigrationConfig) -> Result<Orchestrator> {
    let endpoint = config.oracle.endpoint.clone().context(
        "No oracle endpoint configured (use --oracle-url or TRANSMIGRATE_ORACLE_URL)",
    )?;
    let mut oracle = HttpOracle::new(endpoint)
        .context("Failed to create oracle client")?
        .with_pricing(config.oracle.pricing.clone());
    if let Some(token) = &config.oracle.token {
        oracle = oracle.with_token(token.clone());
    }

    let mut orchestrator = Orchestrator::new(
        Arc::new(oracle),
        Arc::new(BuildRunner::from_config(&config.build)),
        Arc::new(DifferentialVerifier::new(config.verify.clone())),
    )
    .with_retry_policy(config.oracle.retry.clone());
    if let Some(root) = &config.workspace_root {
        orchestrator = orchestrator.with_workspace_root(root.clone());
    }
    Ok(orchestrator)
}

/// Run one job per source. Returns whether every job was accepted.
async fn cmd_migrate(args: &MigrateArgs) -> Result<bool> {
    let config = load_config(args)?;
    let originals = args
        .sources
        .iter()
        .map(|path| {
            OriginalProgram::load(path).with_context(|| format!("Cannot migrate {:?}", path))
        })
        .collect::<Result<Vec<_>>>()?;
    let dirs = job_dirs(&args.output_dir, &args.sources)?;
    let rules = Arc::new(resolve(args.rules.clone())?);
    let orchestrator = Arc::new(build_orchestrator(&config)?);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling running jobs");
            on_signal.cancel();
        }
    });

    let jobs: Vec<MigrationJob> = originals
        .into_iter()
        .zip(dirs.iter())
        .map(|(original, dir)| {
            let mut job = MigrationJob::new(original, Arc::clone(&rules), config.max_attempts)
                .with_cancellation(cancel.clone())
                .with_store(LedgerStore::new(dir.clone()));
            if let Some(secs) = config.job_timeout_secs {
                job = job.with_timeout(Duration::from_secs(secs));
            }
            job
        })
        .collect();

    info!(jobs = jobs.len(), concurrency = args.jobs, "Starting migration");
    let results = run_jobs(orchestrator, jobs, args.jobs).await;

    for (result, dir) in results.iter().zip(dirs.iter()) {
        println!("{}", render_outcome(result, dir));
    }
    Ok(all_accepted(&results))
}

fn render_outcome(result: &std::result::Result<JobResult, MigrationError>, dir: &Path) -> String {
    match result {
        Ok(job) => {
            let detail = match &job.status {
                JobStatus::Accepted { attempt } => format!(
                    "accepted on attempt {} -> {}",
                    attempt,
                    dir.join("final").display()
                ),
                JobStatus::Exhausted { attempts } => {
                    format!("exhausted after {} attempt(s)", attempts.len())
                }
                JobStatus::Aborted { reason } => format!(
                    "aborted after {} attempt(s): {}",
                    job.ledger.len(),
                    reason
                ),
            };
            format!("{}: {}", job.source_name, detail)
        }
        Err(e) => format!("{}: failed to run: {}", dir.display(), e),
    }
}

fn cmd_rules(rules: Option<PathBuf>) -> Result<()> {
    let rules = resolve(rules)?;
    println!("{}", serde_json::to_string_pretty(&rules)?);
    Ok(())
}

fn cmd_ledger(dir: &Path, as_json: bool) -> Result<()> {
    let result = LedgerStore::new(dir)
        .load()
        .with_context(|| format!("Failed to load ledger from {:?}", dir))?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&result.summary())?);
    } else {
        print!("{}", render_ledger(&result));
    }
    Ok(())
}

fn render_ledger(result: &JobResult) -> String {
    let mut out = format!(
        "Job {} ({})\nStatus: {}\n",
        result.job_id,
        result.source_name,
        result.status.label()
    );
    if let JobStatus::Aborted { reason } = &result.status {
        out.push_str(&format!("Reason: {}\n", reason));
    }
    if result.ledger.is_empty() {
        out.push_str("No attempts recorded\n");
        return out;
    }

    out.push_str(&format!(
        "\n{:<4} {:<20} {:<20} {:>6} {:>9} {:>9}  {}\n",
        "#", "OUTCOME", "TIMESTAMP", "ERRORS", "TOKENS", "MS", "FAILING"
    ));
    for attempt in result.ledger.attempts() {
        let summary = attempt.summary();
        let failing: Vec<String> = summary
            .failing_categories
            .iter()
            .map(|c| c.to_string())
            .collect();
        out.push_str(&format!(
            "{:<4} {:<20} {:<20} {:>6} {:>9} {:>9}  {}\n",
            summary.index,
            summary.outcome.as_str(),
            summary.timestamp.format("%Y-%m-%d %H:%M:%S"),
            summary.build_errors,
            summary.usage.oracle.total_tokens(),
            summary.usage.total_ms,
            if failing.is_empty() {
                "-".to_string()
            } else {
                failing.join(",")
            }
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use transmigrate_core::{AbortReason, Ledger};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("parse")
    }

    fn migrate_args(args: &[&str]) -> MigrateArgs {
        let mut argv = vec!["transmigrate", "migrate"];
        argv.extend_from_slice(args);
        match parse(&argv).command {
            Commands::Migrate(args) => args,
            _ => panic!("expected migrate"),
        }
    }

    #[test]
    fn test_migrate_parses_multiple_sources() {
        let args = migrate_args(&["--source", "a.py", "b.py", "--jobs", "2"]);
        assert_eq!(args.sources, vec![PathBuf::from("a.py"), PathBuf::from("b.py")]);
        assert_eq!(args.jobs, 2);
        assert_eq!(args.output_dir, PathBuf::from("generated"));
    }

    #[test]
    fn test_migrate_requires_source() {
        assert!(Cli::try_parse_from(["transmigrate", "migrate"]).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"max_attempts": 4, "verify": {"exec_timeout_secs": 5}}"#,
        )
        .expect("write config");

        let args = migrate_args(&[
            "--source",
            "app.py",
            "--config",
            path.to_str().expect("utf8 path"),
            "--max-attempts",
            "2",
            "--oracle-url",
            "http://127.0.0.1:9/translate",
            "--job-timeout",
            "60",
            "--",
            "python3",
            "-u",
            "{source}",
        ]);
        let config = load_config(&args).expect("config");
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.verify.exec_timeout_secs, 5);
        assert_eq!(
            config.oracle.endpoint.as_deref(),
            Some("http://127.0.0.1:9/translate")
        );
        assert_eq!(config.verify.original_command, vec!["python3", "-u", "{source}"]);
        assert_eq!(config.job_timeout_secs, Some(60));
    }

    #[test]
    fn test_original_command_keeps_spaced_arguments() {
        let args = migrate_args(&[
            "--source",
            "app.py",
            "--",
            "/opt/My Python/bin/python3",
            "-X",
            "utf8",
            "{source}",
        ]);
        assert_eq!(
            args.original_cmd,
            vec!["/opt/My Python/bin/python3", "-X", "utf8", "{source}"]
        );
        assert_eq!(args.sources, vec![PathBuf::from("app.py")]);

        let config = load_config(&migrate_args(&["--source", "app.py"])).expect("config");
        assert_eq!(config.verify.original_command, vec!["python3", "{source}"]);
    }

    #[test]
    fn test_zero_max_attempts_is_rejected() {
        let args = migrate_args(&["--source", "app.py", "--max-attempts", "0"]);
        let err = load_config(&args).expect_err("invalid");
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_missing_oracle_endpoint() {
        let err = build_orchestrator(&MigrationConfig::default())
            .err()
            .expect("no endpoint");
        assert!(err.to_string().contains("No oracle endpoint"));
    }

    #[test]
    fn test_job_dirs_by_stem() {
        let sources = vec![PathBuf::from("src/app.py"), PathBuf::from("tools/plot.py")];
        let dirs = job_dirs(Path::new("out"), &sources).expect("dirs");
        assert_eq!(dirs, vec![PathBuf::from("out/app"), PathBuf::from("out/plot")]);

        let clash = vec![PathBuf::from("a/app.py"), PathBuf::from("b/app.py")];
        assert!(job_dirs(Path::new("out"), &clash).is_err());
    }

    #[tokio::test]
    async fn test_migrate_rejects_empty_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("empty.py");
        std::fs::write(&source, "   \n").expect("write");

        let args = migrate_args(&[
            "--source",
            source.to_str().expect("utf8 path"),
            "--oracle-url",
            "http://127.0.0.1:9/translate",
        ]);
        let err = cmd_migrate(&args).await.expect_err("empty source");
        assert!(format!("{:#}", err).contains("Cannot migrate"));
    }

    #[test]
    fn test_ledger_round_trip_renders_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LedgerStore::new(dir.path().join("app"));
        store.prepare().expect("prepare");

        let started_at = chrono::Utc::now();
        let result = JobResult {
            job_id: uuid::Uuid::new_v4(),
            source_name: "app.py".to_string(),
            status: JobStatus::Aborted {
                reason: AbortReason::Cancelled,
            },
            ledger: Ledger::new(),
            started_at,
            finished_at: started_at + chrono::Duration::seconds(1),
        };
        store.finalize(&result).expect("finalize");

        let loaded = store.load().expect("load");
        let table = render_ledger(&loaded);
        assert!(table.contains("(app.py)"));
        assert!(table.contains("Status: aborted"));
        assert!(table.contains("Reason: cancelled"));
        assert!(table.contains("No attempts recorded"));
    }

    #[test]
    fn test_render_outcome() {
        let err: std::result::Result<JobResult, MigrationError> =
            Err(MigrationError::TaskFailed("panicked".to_string()));
        let line = render_outcome(&err, Path::new("generated/app"));
        assert_eq!(line, "generated/app: failed to run: job task failed: panicked");
    }
}
