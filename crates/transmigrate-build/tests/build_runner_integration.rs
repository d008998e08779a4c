//! Integration tests for the build runner with shell stand-ins for cargo.

use transmigrate_build::{BuildRunner, StageConfig, StageRole};
use transmigrate_core::domain::{BuildVerdict, Candidate, DiagnosticSource};
use transmigrate_core::rules::{LintPolicy, RuleSet};
use transmigrate_core::stages::BuildStage;
use transmigrate_core::workspace::AttemptWorkspace;

const TYPE_ERROR: &str = r#"{"reason":"compiler-message","package_id":"app 0.1.0","message":{"message":"mismatched types","code":{"code":"E0308","explanation":null},"level":"error","spans":[{"file_name":"src/main.rs","line_start":3,"line_end":3,"column_start":5,"column_end":8,"is_primary":true}],"children":[],"rendered":"error[E0308]: mismatched types\n --> src/main.rs:3:5\n"}}
{"reason":"compiler-message","package_id":"app 0.1.0","message":{"message":"aborting due to 1 previous error","code":null,"level":"error","spans":[],"children":[],"rendered":"error: aborting due to 1 previous error\n"}}
{"reason":"build-finished","success":false}
"#;

const NEEDLESS_RETURN: &str = r#"{"reason":"compiler-message","package_id":"app 0.1.0","message":{"message":"unneeded `return` statement","code":{"code":"clippy::needless_return","explanation":null},"level":"error","spans":[{"file_name":"src/main.rs","line_start":2,"line_end":2,"column_start":5,"column_end":14,"is_primary":true}],"children":[],"rendered":"error: unneeded `return` statement\n --> src/main.rs:2:5\n"}}
{"reason":"build-finished","success":false}
"#;

fn sh(name: &str, role: StageRole, script: &str) -> StageConfig {
    StageConfig::custom(
        name.to_string(),
        vec!["sh".to_string(), "-c".to_string(), script.to_string()],
        role,
        30,
    )
}

fn workspace() -> AttemptWorkspace {
    let candidate = Candidate::default()
        .with_file("Cargo.toml", "[package]\nname = \"app\"\nversion = \"0.1.0\"\n")
        .with_file("src/main.rs", "fn main() {\n    return;\n}\n")
        .with_file("fixtures/check.json", TYPE_ERROR)
        .with_file("fixtures/clippy.json", NEEDLESS_RETURN);
    AttemptWorkspace::materialize(&candidate, 1, None).expect("materialize")
}

fn lint_failing_runner() -> BuildRunner {
    BuildRunner::new(vec![
        sh(
            "cargo_check",
            StageRole::Compile,
            "echo '{\"reason\":\"build-finished\",\"success\":true}'",
        ),
        sh("cargo_clippy", StageRole::Lint, "cat fixtures/clippy.json; exit 101"),
    ])
}

/// Test: a failing lint stage does not fail the build under an advisory policy
#[tokio::test]
async fn test_lint_failure_advisory_passes() {
    let ws = workspace();
    let report = lint_failing_runner().run(ws.path(), LintPolicy::Advisory).await;

    assert_eq!(report.verdict, BuildVerdict::Pass);
    assert_eq!(report.stages.len(), 2);
    assert!(!report.stages[1].success);
    assert!(!report.stages[1].blocking);
    assert_eq!(report.blocking_diagnostics().count(), 0);

    let advisory: Vec<_> = report.advisory_findings().collect();
    assert_eq!(advisory.len(), 1);
    assert_eq!(advisory[0].code.as_deref(), Some("clippy::needless_return"));
}

/// Test: the same lint failure fails the build under a blocking policy
#[tokio::test]
async fn test_lint_failure_blocking_fails() {
    let ws = workspace();
    let report = lint_failing_runner().run(ws.path(), LintPolicy::Blocking).await;

    assert_eq!(report.verdict, BuildVerdict::Fail);
    assert!(report.stages[1].blocking);
    let blocking: Vec<_> = report.blocking_diagnostics().collect();
    assert_eq!(blocking.len(), 1);
    assert_eq!(blocking[0].source, DiagnosticSource::Clippy);
}

/// Test: compiler errors are parsed with location and both stages still run
#[tokio::test]
async fn test_compile_error_is_parsed() {
    let ws = workspace();
    let runner = BuildRunner::new(vec![
        sh(
            "cargo_check",
            StageRole::Compile,
            "cat fixtures/check.json; echo 'error: could not compile `app`' >&2; exit 101",
        ),
        // Clippy re-runs the compiler and reports the same error.
        sh("cargo_clippy", StageRole::Lint, "cat fixtures/check.json; exit 101"),
    ]);

    let report = runner.run(ws.path(), LintPolicy::Advisory).await;

    assert_eq!(report.verdict, BuildVerdict::Fail);
    assert_eq!(report.stages.len(), 2);
    assert_eq!(report.diagnostics.len(), 1, "duplicate from lint pass is dropped");

    let diag = &report.diagnostics[0];
    assert_eq!(diag.source, DiagnosticSource::Rustc);
    assert_eq!(diag.code.as_deref(), Some("E0308"));
    assert_eq!(
        diag.render(),
        "error[E0308]: mismatched types\n --> src/main.rs:3:5"
    );
    assert!(report.render_log().contains("== cargo_check (failed) =="));
}

/// Test: an unspawnable compiler is a failing stage with a synthetic diagnostic
#[tokio::test]
async fn test_missing_compiler_is_synthetic_failure() {
    let ws = workspace();
    let runner = BuildRunner::new(vec![StageConfig::custom(
        "cargo_check".to_string(),
        vec!["transmigrate-missing-cargo".to_string(), "check".to_string()],
        StageRole::Compile,
        30,
    )]);

    let report = runner.run(ws.path(), LintPolicy::Advisory).await;

    assert_eq!(report.verdict, BuildVerdict::Fail);
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].source, DiagnosticSource::Runner);
    assert!(report.diagnostics[0].message.contains("could not run"));
    assert_eq!(report.stages[0].exit_code, None);
}

/// Test: a hung compiler is cut off by the stage timeout
#[tokio::test]
async fn test_stage_timeout() {
    let ws = workspace();
    let mut config = sh("cargo_check", StageRole::Compile, "sleep 30");
    config.timeout_secs = 1;

    let report = BuildRunner::new(vec![config]).run(ws.path(), LintPolicy::Advisory).await;

    assert_eq!(report.verdict, BuildVerdict::Fail);
    assert!(report.stages[0].timed_out);
    assert!(report.diagnostics[0].message.contains("timed out"));
}

/// Test: the lint policy comes from the rule set when run as a build stage
#[tokio::test]
async fn test_build_stage_uses_rule_lint_policy() {
    let ws = workspace();
    let runner = lint_failing_runner();

    let advisory = RuleSet::from_json_str(r#"{"critical_differences": {"core": []}}"#, "test")
        .expect("rules");
    let report = runner.build(&ws, &advisory).await.expect("build");
    assert_eq!(report.lint_policy, LintPolicy::Advisory);
    assert!(report.passed());

    let blocking = RuleSet::from_json_str(
        r#"{"critical_differences": {"core": [], "build": ["compiles", "clippy"]}}"#,
        "test",
    )
    .expect("rules");
    let report = runner.build(&ws, &blocking).await.expect("build");
    assert_eq!(report.lint_policy, LintPolicy::Blocking);
    assert!(!report.passed());
}

/// Test: disabled stages are skipped entirely
#[tokio::test]
async fn test_disabled_stage_skipped() {
    let ws = workspace();
    let runner = BuildRunner::new(vec![
        sh("cargo_check", StageRole::Compile, "exit 0"),
        sh("cargo_clippy", StageRole::Lint, "exit 1").disabled(),
    ]);

    let report = runner.run(ws.path(), LintPolicy::Blocking).await;
    assert_eq!(report.verdict, BuildVerdict::Pass);
    assert_eq!(report.stages.len(), 1);
}
