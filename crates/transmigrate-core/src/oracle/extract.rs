//! Fenced code block extraction from free-form oracle completions.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

fn fenced(lang: &'static str) -> Regex {
    Regex::new(&format!(r"(?s)```{}[ \t]*\r?\n(.*?)```", lang))
        .expect("fence pattern is valid")
}

fn rust_fence() -> &'static Regex {
    static RUST: OnceLock<Regex> = OnceLock::new();
    RUST.get_or_init(|| fenced("rust"))
}

fn toml_fence() -> &'static Regex {
    static TOML: OnceLock<Regex> = OnceLock::new();
    TOML.get_or_init(|| fenced("toml"))
}

/// First ```` ```rust ```` and ```` ```toml ```` blocks, as `src/main.rs` and `Cargo.toml`.
///
/// Both blocks are required.
pub fn extract_files(completion: &str) -> Result<BTreeMap<String, String>, String> {
    let rust = rust_fence()
        .captures(completion)
        .and_then(|c| c.get(1))
        .ok_or_else(|| "no ```rust code block found in completion".to_string())?;
    let toml = toml_fence()
        .captures(completion)
        .and_then(|c| c.get(1))
        .ok_or_else(|| "no ```toml code block found in completion".to_string())?;

    let mut files = BTreeMap::new();
    files.insert("src/main.rs".to_string(), format!("{}\n", rust.as_str().trim()));
    files.insert("Cargo.toml".to_string(), format!("{}\n", toml.as_str().trim()));
    Ok(files)
}
