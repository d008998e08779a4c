//! Tracing subscriber setup for transmigrate binaries.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const WORKSPACE_TARGETS: [&str; 4] = [
    "transmigrate",
    "transmigrate_core",
    "transmigrate_build",
    "transmigrate_verify",
];

/// Filter used when `RUST_LOG` is unset: `level` for our own crates,
/// warnings only for dependencies (HTTP client, runtime).
pub fn default_directives(level: Level) -> String {
    let mut directives: Vec<String> = WORKSPACE_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level.as_str().to_ascii_lowercase()))
        .collect();
    directives.push("warn".to_string());
    directives.join(",")
}

/// Install the global subscriber, writing to stderr so stdout stays free
/// for command output. `json` selects newline-delimited JSON lines.
///
/// Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let base = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let layer = if json {
        base.json().boxed()
    } else {
        base.boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .ok();
}
