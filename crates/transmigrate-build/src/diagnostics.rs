//! Normalization of compiler and linter output into [`Diagnostic`]s.
//!
//! Cargo's `--message-format=json` records are preferred. Plain rustc output
//! is parsed as a fallback, and a failing stage with nothing parseable
//! yields one synthetic error carrying the tail of its output.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use transmigrate_core::domain::{Diagnostic, DiagnosticSource, Severity};

use crate::runner::StageResult;

/// Lines of output quoted in a synthetic diagnostic.
const TAIL_LINES: usize = 40;

#[derive(Debug, Deserialize)]
struct CargoMessage {
    reason: String,
    #[serde(default)]
    message: Option<RustcMessage>,
}

#[derive(Debug, Deserialize)]
struct RustcMessage {
    message: String,
    #[serde(default)]
    code: Option<RustcCode>,
    level: String,
    #[serde(default)]
    spans: Vec<RustcSpan>,
    #[serde(default)]
    rendered: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RustcCode {
    code: String,
}

#[derive(Debug, Deserialize)]
struct RustcSpan {
    file_name: String,
    line_start: u32,
    column_start: u32,
    #[serde(default)]
    is_primary: bool,
}

fn severity_of(level: &str) -> Option<Severity> {
    match level {
        "error" | "error: internal compiler error" => Some(Severity::Error),
        "warning" => Some(Severity::Warning),
        "note" | "help" => Some(Severity::Hint),
        _ => None,
    }
}

/// Compiler summaries that restate other diagnostics.
fn is_summary(message: &str) -> bool {
    static SUMMARY: OnceLock<Regex> = OnceLock::new();
    SUMMARY
        .get_or_init(|| {
            Regex::new(
                r"^(aborting due to|could not compile|\d+ warnings? emitted|.* generated \d+ warnings?)",
            )
            .expect("summary regex")
        })
        .is_match(message)
}

/// Diagnostics from cargo JSON `compiler-message` records in `stdout`.
pub fn parse_cargo_json(stdout: &str, source: DiagnosticSource) -> Vec<Diagnostic> {
    stdout
        .lines()
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str::<CargoMessage>(line).ok())
        .filter(|msg| msg.reason == "compiler-message")
        .filter_map(|msg| msg.message)
        .filter(|msg| !is_summary(&msg.message))
        .filter_map(|msg| {
            let severity = severity_of(&msg.level)?;
            let mut diag = Diagnostic::new(severity, msg.message, source);
            if let Some(code) = msg.code {
                diag = diag.with_code(code.code);
            }
            if let Some(span) = msg
                .spans
                .iter()
                .find(|s| s.is_primary)
                .or_else(|| msg.spans.first())
            {
                diag = diag.with_location(
                    span.file_name.clone(),
                    span.line_start,
                    span.column_start,
                );
            }
            if let Some(rendered) = msg.rendered {
                diag = diag.with_evidence(rendered.trim_end().to_string());
            }
            Some(diag)
        })
        .collect()
}

/// Diagnostics from human-readable rustc/cargo output.
///
/// Recognizes `error[E0308]: message` headers followed by an optional
/// ` --> file:line:col` line; the block up to the next blank line is kept
/// as evidence.
pub fn parse_human(output: &str, source: DiagnosticSource) -> Vec<Diagnostic> {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    static LOCATION: OnceLock<Regex> = OnceLock::new();
    let header = HEADER.get_or_init(|| {
        Regex::new(r"^(error|warning)(?:\[([A-Za-z0-9_:]+)\])?: (.+)$").expect("header regex")
    });
    let location = LOCATION.get_or_init(|| {
        Regex::new(r"^\s*--> (.+):(\d+):(\d+)\s*$").expect("location regex")
    });

    let mut diagnostics = Vec::new();
    let lines: Vec<&str> = output.lines().collect();
    let mut i = 0;
    while i < lines.len() {
        let Some(caps) = header.captures(lines[i]) else {
            i += 1;
            continue;
        };
        let message = caps[3].trim().to_string();

        let mut end = i + 1;
        while end < lines.len() && !lines[end].trim().is_empty() && !header.is_match(lines[end]) {
            end += 1;
        }

        if !is_summary(&message) {
            let severity = if &caps[1] == "error" {
                Severity::Error
            } else {
                Severity::Warning
            };
            let mut diag = Diagnostic::new(severity, message, source)
                .with_evidence(lines[i..end].join("\n"));
            if let Some(code) = caps.get(2) {
                diag = diag.with_code(code.as_str());
            }
            if let Some(loc) = lines[i + 1..end].iter().find_map(|l| location.captures(l)) {
                if let (Ok(line), Ok(column)) = (loc[2].parse(), loc[3].parse()) {
                    diag = diag.with_location(loc[1].to_string(), line, column);
                }
            }
            diagnostics.push(diag);
        }
        i = end;
    }
    diagnostics
}

/// All diagnostics for one stage result.
///
/// `source` attributes parsed diagnostics to the tool. Synthetic entries
/// for compile stages are attributed to the runner; for lint stages they
/// stay with the linter so the lint policy still applies to them.
pub fn stage_diagnostics(result: &StageResult, source: DiagnosticSource) -> Vec<Diagnostic> {
    let mut diagnostics = parse_cargo_json(&result.stdout, source);
    if diagnostics.is_empty() {
        diagnostics = parse_human(&result.stderr, source);
        diagnostics.extend(parse_human(&result.stdout, source));
    }

    if !result.passed() && !diagnostics.iter().any(Diagnostic::is_error) {
        let synthetic_source = match source {
            DiagnosticSource::Clippy => DiagnosticSource::Clippy,
            _ => DiagnosticSource::Runner,
        };
        diagnostics.push(synthetic(result, synthetic_source));
    }
    diagnostics
}

fn synthetic(result: &StageResult, source: DiagnosticSource) -> Diagnostic {
    let message = if let Some(err) = &result.spawn_error {
        format!("stage {} could not run: {}", result.stage_name, err)
    } else if result.timed_out {
        format!("stage {} timed out", result.stage_name)
    } else {
        match result.exit_code {
            Some(code) => format!("stage {} failed with exit code {}", result.stage_name, code),
            None => format!("stage {} was terminated by a signal", result.stage_name),
        }
    };

    let tail = result.output_tail(TAIL_LINES);
    let evidence = if tail.is_empty() {
        message.clone()
    } else {
        format!("{}\n{}", message, tail)
    };
    Diagnostic::new(Severity::Error, message, source).with_evidence(evidence)
}

/// Drop diagnostics from `later` that `earlier` already reported.
///
/// The lint pass re-runs the compiler, so every compiler diagnostic shows up
/// twice otherwise.
pub fn dedupe_against(earlier: &[Diagnostic], later: Vec<Diagnostic>) -> Vec<Diagnostic> {
    later
        .into_iter()
        .filter(|d| {
            !earlier.iter().any(|e| {
                e.severity == d.severity
                    && e.code == d.code
                    && e.message == d.message
                    && e.location == d.location
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPE_ERROR_JSON: &str = r#"{"reason":"compiler-message","package_id":"app 0.1.0","target":{"kind":["bin"],"name":"app"},"message":{"message":"mismatched types","code":{"code":"E0308","explanation":"..."},"level":"error","spans":[{"file_name":"src/main.rs","line_start":3,"line_end":3,"column_start":5,"column_end":7,"is_primary":true}],"children":[],"rendered":"error[E0308]: mismatched types\n --> src/main.rs:3:5\n  |\n3 |     \"x\"\n  |     ^^^ expected `u32`, found `&str`\n\n"}}"#;
    const ABORT_JSON: &str = r#"{"reason":"compiler-message","package_id":"app 0.1.0","message":{"message":"aborting due to 1 previous error","code":null,"level":"error","spans":[],"children":[],"rendered":"error: aborting due to 1 previous error\n\n"}}"#;
    const ARTIFACT_JSON: &str = r#"{"reason":"build-finished","success":false}"#;

    fn failed(stdout: &str, stderr: &str) -> StageResult {
        StageResult {
            stage_name: "cargo_check".to_string(),
            command: "cargo check".to_string(),
            exit_code: Some(101),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration_ms: 5,
            success: false,
            timed_out: false,
            spawn_error: None,
        }
    }

    #[test]
    fn test_parse_cargo_json_error() {
        let stdout = format!("{}\n{}\n{}\n", TYPE_ERROR_JSON, ABORT_JSON, ARTIFACT_JSON);
        let diags = parse_cargo_json(&stdout, DiagnosticSource::Rustc);

        assert_eq!(diags.len(), 1);
        let d = &diags[0];
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.code.as_deref(), Some("E0308"));
        assert_eq!(d.message, "mismatched types");
        let loc = d.location.as_ref().expect("location");
        assert_eq!((loc.file.as_str(), loc.line, loc.column), ("src/main.rs", 3, 5));
        assert!(d.render().starts_with("error[E0308]: mismatched types\n --> src/main.rs:3:5"));
    }

    #[test]
    fn test_parse_cargo_json_ignores_noise() {
        let stdout = "Compiling app\nnot json\n{\"reason\":\"compiler-artifact\"}\n";
        assert!(parse_cargo_json(stdout, DiagnosticSource::Rustc).is_empty());
    }

    #[test]
    fn test_parse_human_format() {
        let stderr = "\
   Compiling app v0.1.0
error[E0308]: mismatched types
 --> src/main.rs:3:5
  |
3 |     \"x\"
  |     ^^^ expected `u32`, found `&str`

warning: unused variable: `y`
 --> src/main.rs:2:9

error: aborting due to 1 previous error; 1 warning emitted
error: could not compile `app` (bin \"app\") due to 1 previous error
";
        let diags = parse_human(stderr, DiagnosticSource::Rustc);
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].code.as_deref(), Some("E0308"));
        assert_eq!(diags[0].location.as_ref().map(|l| l.line), Some(3));
        assert!(diags[0]
            .evidence
            .as_deref()
            .expect("evidence")
            .contains("expected `u32`"));
        assert_eq!(diags[1].severity, Severity::Warning);
        assert_eq!(diags[1].location.as_ref().map(|l| l.column), Some(9));
    }

    #[test]
    fn test_parse_human_manifest_error() {
        let stderr = "error: failed to parse manifest at `/tmp/x/Cargo.toml`\n\nCaused by:\n  missing field `name`\n";
        let diags = parse_human(stderr, DiagnosticSource::Rustc);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("failed to parse manifest"));
        assert!(diags[0].location.is_none());
    }

    #[test]
    fn test_stage_diagnostics_prefers_json() {
        let result = failed(TYPE_ERROR_JSON, "error: could not compile `app`\n");
        let diags = stage_diagnostics(&result, DiagnosticSource::Rustc);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].source, DiagnosticSource::Rustc);
    }

    #[test]
    fn test_stage_diagnostics_synthetic_tail() {
        let result = failed("", "segfault in linker\n");
        let diags = stage_diagnostics(&result, DiagnosticSource::Rustc);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].source, DiagnosticSource::Runner);
        assert!(diags[0].message.contains("exit code 101"));
        assert!(diags[0].render().contains("segfault in linker"));
    }

    #[test]
    fn test_stage_diagnostics_lint_synthetic_stays_lint() {
        let mut result = failed("", "error: no such command: `clippy`\n");
        result.stage_name = "cargo_clippy".to_string();
        let diags = stage_diagnostics(&result, DiagnosticSource::Clippy);
        assert!(!diags.is_empty());
        assert!(diags.iter().all(|d| d.source == DiagnosticSource::Clippy));
    }

    #[test]
    fn test_stage_diagnostics_timeout() {
        let mut result = failed("", "");
        result.exit_code = None;
        result.timed_out = true;
        let diags = stage_diagnostics(&result, DiagnosticSource::Rustc);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("timed out"));
    }

    #[test]
    fn test_passing_stage_has_no_synthetic() {
        let mut result = failed("", "");
        result.exit_code = Some(0);
        result.success = true;
        assert!(stage_diagnostics(&result, DiagnosticSource::Rustc).is_empty());
    }

    #[test]
    fn test_dedupe_against() {
        let check = parse_cargo_json(TYPE_ERROR_JSON, DiagnosticSource::Rustc);
        let mut clippy = parse_cargo_json(TYPE_ERROR_JSON, DiagnosticSource::Clippy);
        clippy.push(
            Diagnostic::new(Severity::Error, "needless return", DiagnosticSource::Clippy)
                .with_code("clippy::needless_return"),
        );

        let remaining = dedupe_against(&check, clippy);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].code.as_deref(), Some("clippy::needless_return"));
    }
}
