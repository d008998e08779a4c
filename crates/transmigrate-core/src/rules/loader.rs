//! Layered rule resolution: job-local > user-level > packaged default.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::RuleSet;
use crate::domain::error::ConfigError;

/// Rule document compiled into the binary; the lowest layer.
pub const PACKAGED_RULES: &str = include_str!("default_rules.json");

/// Job-local rule file looked up in the working directory.
pub const JOB_RULES_FILE: &str = "migration_rules.json";

/// One rule document location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleLayer {
    /// Named explicitly by the user: must exist.
    Explicit(PathBuf),
    /// Conventional location: skipped when absent.
    Implicit(PathBuf),
}

impl RuleLayer {
    pub fn path(&self) -> &Path {
        match self {
            RuleLayer::Explicit(p) | RuleLayer::Implicit(p) => p,
        }
    }

    fn load(&self) -> Result<Option<RuleSet>, ConfigError> {
        let path = self.path();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return match self {
                    RuleLayer::Explicit(p) => Err(ConfigError::MissingRuleDocument(p.clone())),
                    RuleLayer::Implicit(_) => Ok(None),
                };
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        RuleSet::from_json_str(&text, &path.display().to_string()).map(Some)
    }
}

/// Where to look for the user and job rule layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSources {
    pub user: Option<RuleLayer>,
    pub job: Option<RuleLayer>,
}

impl RuleSources {
    /// Packaged default only.
    pub fn packaged_only() -> Self {
        Self::default()
    }

    /// Conventional lookup.
    ///
    /// Job layer: `explicit_job` if given, else `<cwd>/migration_rules.json`.
    /// User layer: `<config_dir>/transmigrate/rules.json`.
    pub fn discover(explicit_job: Option<PathBuf>, cwd: &Path) -> Self {
        let job = match explicit_job {
            Some(path) => RuleLayer::Explicit(path),
            None => RuleLayer::Implicit(cwd.join(JOB_RULES_FILE)),
        };
        let user = dirs::config_dir()
            .map(|dir| RuleLayer::Implicit(dir.join("transmigrate").join("rules.json")));
        Self {
            user,
            job: Some(job),
        }
    }

    pub fn with_user(mut self, layer: RuleLayer) -> Self {
        self.user = Some(layer);
        self
    }

    pub fn with_job(mut self, layer: RuleLayer) -> Self {
        self.job = Some(layer);
        self
    }
}

/// Resolve the effective rule set: packaged default, then user, then job.
pub fn resolve_rules(sources: &RuleSources) -> Result<RuleSet, ConfigError> {
    let mut rules = RuleSet::from_json_str(PACKAGED_RULES, "packaged default")?;

    for layer in [&sources.user, &sources.job].into_iter().flatten() {
        if let Some(overlay) = layer.load()? {
            debug!(path = %layer.path().display(), "applying rule layer");
            rules = rules.merge(overlay);
        }
    }

    Ok(rules)
}
