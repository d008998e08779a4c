//! Locating build outputs from cargo's JSON message stream.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ArtifactMessage {
    reason: String,
    #[serde(default)]
    target: Option<ArtifactTarget>,
    #[serde(default)]
    executable: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ArtifactTarget {
    #[serde(default)]
    kind: Vec<String>,
    #[serde(default)]
    name: String,
}

/// Path of the binary reported by `compiler-artifact` records.
///
/// When several binaries are built, the one named `prefer` wins; otherwise
/// the last reported binary is returned.
pub fn executable_from(stdout: &str, prefer: Option<&str>) -> Option<PathBuf> {
    let binaries: Vec<(String, PathBuf)> = stdout
        .lines()
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str::<ArtifactMessage>(line).ok())
        .filter(|msg| msg.reason == "compiler-artifact")
        .filter_map(|msg| {
            let target = msg.target?;
            let exe = msg.executable?;
            target
                .kind
                .iter()
                .any(|k| k == "bin")
                .then_some((target.name, exe))
        })
        .collect();

    if let Some(name) = prefer {
        if let Some((_, exe)) = binaries.iter().find(|(n, _)| n == name) {
            return Some(exe.clone());
        }
    }
    binaries.into_iter().last().map(|(_, exe)| exe)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEP: &str = r#"{"reason":"compiler-artifact","package_id":"itoa 1.0.0","target":{"kind":["lib"],"name":"itoa"},"filenames":["/t/libitoa.rlib"],"executable":null,"fresh":true}"#;
    const BIN: &str = r#"{"reason":"compiler-artifact","package_id":"app 0.1.0","target":{"kind":["bin"],"name":"app"},"filenames":["/t/release/app"],"executable":"/t/release/app","fresh":false}"#;
    const TOOL: &str = r#"{"reason":"compiler-artifact","package_id":"app 0.1.0","target":{"kind":["bin"],"name":"gen"},"filenames":["/t/release/gen"],"executable":"/t/release/gen","fresh":false}"#;

    #[test]
    fn test_executable_from_single_binary() {
        let stdout = format!(
            "{}\n{}\n{{\"reason\":\"build-finished\",\"success\":true}}\n",
            DEP, BIN
        );
        assert_eq!(
            executable_from(&stdout, None),
            Some(PathBuf::from("/t/release/app"))
        );
    }

    #[test]
    fn test_executable_from_prefers_name() {
        let stdout = format!("{}\n{}\n", BIN, TOOL);
        assert_eq!(
            executable_from(&stdout, Some("app")),
            Some(PathBuf::from("/t/release/app"))
        );
        assert_eq!(
            executable_from(&stdout, None),
            Some(PathBuf::from("/t/release/gen"))
        );
    }

    #[test]
    fn test_executable_from_no_binary() {
        assert_eq!(executable_from(DEP, None), None);
        assert_eq!(executable_from("error: could not compile", None), None);
    }
}
