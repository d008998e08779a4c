//! Critical/ignorable difference rules.
//!
//! A [`RuleSet`] is the resolved, validated form of one or more layered rule
//! documents. It names which critical-difference categories must match between
//! the original program and a candidate, carries each category's parameters,
//! and lists ignorable differences.
//!
//! Rule documents are JSON:
//!
//! ```json
//! {
//!   "ignorable_differences": ["time taken"],
//!   "lint_policy": "advisory",
//!   "critical_differences": {
//!     "core": { "checks": ["Algorithm correctness"], "cases": [{"args": ["4"]}] },
//!     "build": ["clippy"]
//!   }
//! }
//! ```
//!
//! A category value may be a bare list of sub-check names, shorthand for
//! `{"checks": [...]}`. A `null` value removes the category inherited from a
//! lower layer, e.g. `"core": null` for a program that only serves HTTP.

pub mod loader;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::ConfigError;

pub use loader::{resolve_rules, RuleLayer, RuleSources, JOB_RULES_FILE, PACKAGED_RULES};

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Closed set of critical-difference categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Computed results of the program's core logic.
    Core,
    /// Network endpoints: path/method pairs and content-type families.
    Routing,
    /// Emitted image artifacts: encoding, integrity, dimensions.
    Image,
    /// Structured markup: tag-tree shape.
    Template,
    /// Named fixed data artifacts, compared exactly.
    Data,
    /// Build health, including lint findings.
    Build,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Core,
        Category::Routing,
        Category::Image,
        Category::Template,
        Category::Data,
        Category::Build,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Core => "core",
            Category::Routing => "routing",
            Category::Image => "image",
            Category::Template => "template",
            Category::Data => "data",
            Category::Build => "build",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownCategory(s.to_string()))
    }
}

/// Whether a failing lint pass blocks acceptance of a candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LintPolicy {
    /// Non-zero linter exit fails the build.
    Blocking,
    /// Lint findings are reported but never fail the build.
    Advisory,
}

// ---------------------------------------------------------------------------
// Category parameters
// ---------------------------------------------------------------------------

/// One execution of a program: argv and optional stdin.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(deny_unknown_fields)]
pub struct ExecutionCase {
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
}

impl ExecutionCase {
    pub fn with_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
        }
    }

    /// Short label used in explanations, e.g. `args=["4"]`.
    pub fn label(&self) -> String {
        match &self.stdin {
            Some(stdin) => format!("args={:?} stdin={:?}", self.args, stdin),
            None => format!("args={:?}", self.args),
        }
    }
}

fn default_float_tolerance() -> f64 {
    1e-9
}

/// Parameters of the `core` category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CoreParams {
    /// Input set both programs are run on. Empty means one run without arguments.
    #[serde(default)]
    pub cases: Vec<ExecutionCase>,

    /// Absolute tolerance for floating-point tokens.
    #[serde(default = "default_float_tolerance")]
    pub float_tolerance: f64,
}

impl Default for CoreParams {
    fn default() -> Self {
        Self {
            cases: Vec::new(),
            float_tolerance: default_float_tolerance(),
        }
    }
}

impl CoreParams {
    pub fn effective_cases(&self) -> Vec<ExecutionCase> {
        if self.cases.is_empty() {
            vec![ExecutionCase::default()]
        } else {
            self.cases.clone()
        }
    }
}

fn default_method() -> String {
    "GET".to_string()
}

const HTTP_METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// A network endpoint as written in a rule document.
///
/// `path` may be a route template (`/primes/<n>`, `/primes/<int:n>` or
/// `/primes/{n}`); placeholders are filled from `params`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(deny_unknown_fields)]
pub struct EndpointRule {
    #[serde(default = "default_method")]
    pub method: String,

    pub path: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,

    /// Request body, sent form-encoded as written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// A concrete HTTP request derived from an [`EndpointRule`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResolvedEndpoint {
    pub method: String,
    pub path: String,
    pub body: Option<String>,
}

impl fmt::Display for ResolvedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

fn route_placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"<(?:[A-Za-z_]+:)?([A-Za-z_][A-Za-z0-9_]*)>|\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .expect("route placeholder pattern is valid")
    })
}

impl EndpointRule {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            params: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Instantiate the route template into a concrete request.
    pub fn resolve(&self) -> Result<ResolvedEndpoint, String> {
        let method = self.method.to_ascii_uppercase();
        if !HTTP_METHODS.contains(&method.as_str()) {
            return Err(format!("unsupported HTTP method `{}`", self.method));
        }
        if !self.path.starts_with('/') {
            return Err(format!("endpoint path `{}` must start with `/`", self.path));
        }

        let mut missing = Vec::new();
        let path = route_placeholder()
            .replace_all(&self.path, |caps: &regex::Captures<'_>| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                match self.params.get(name) {
                    Some(value) => value.clone(),
                    None => {
                        missing.push(name.to_string());
                        String::new()
                    }
                }
            })
            .into_owned();

        if !missing.is_empty() {
            return Err(format!(
                "endpoint `{}` has no sample value for {}",
                self.path,
                missing.join(", ")
            ));
        }

        Ok(ResolvedEndpoint {
            method,
            path,
            body: self.body.clone(),
        })
    }
}

/// Where an artifact under comparison comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum ArtifactSource {
    /// Response body of an HTTP request to the serving program.
    Endpoint(EndpointRule),

    /// Output of a one-shot run: stdout, or `file` written into the run's
    /// working directory.
    Run {
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        stdin: Option<String>,
        #[serde(default)]
        file: Option<String>,
    },
}

impl ArtifactSource {
    pub fn stdout_of(case: ExecutionCase) -> Self {
        ArtifactSource::Run {
            args: case.args,
            stdin: case.stdin,
            file: None,
        }
    }

    pub fn run_case(&self) -> Option<ExecutionCase> {
        match self {
            ArtifactSource::Run { args, stdin, .. } => Some(ExecutionCase {
                args: args.clone(),
                stdin: stdin.clone(),
            }),
            ArtifactSource::Endpoint(_) => None,
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            ArtifactSource::Endpoint(endpoint) => endpoint.resolve().map(|_| ()),
            ArtifactSource::Run { file, .. } => match file {
                Some(path) if path.is_empty() || path.starts_with('/') || path.contains("..") => {
                    Err(format!("artifact file `{}` must be a relative path", path))
                }
                _ => Ok(()),
            },
        }
    }
}

/// Parameters of the `routing` category.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RoutingParams {
    #[serde(default)]
    pub endpoints: Vec<EndpointRule>,
}

/// Parameters of the `image` category.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ImageParams {
    #[serde(default)]
    pub sources: Vec<ArtifactSource>,

    /// Required `[width, height]`; when absent the candidate must match the original.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_size: Option<(u32, u32)>,
}

/// Parameters of the `template` category.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TemplateParams {
    #[serde(default)]
    pub sources: Vec<ArtifactSource>,
}

/// A named data artifact extracted from a source with a regex.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DataArtifact {
    pub name: String,
    pub source: ArtifactSource,
    /// Every match (or first capture group, when present) forms the artifact.
    pub pattern: String,
}

/// Parameters of the `data` category.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DataParams {
    #[serde(default)]
    pub artifacts: Vec<DataArtifact>,
}

/// Parameters of the `build` category.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BuildParams {}

/// Category-specific parameters.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum CategoryParams {
    Core(CoreParams),
    Routing(RoutingParams),
    Image(ImageParams),
    Template(TemplateParams),
    Data(DataParams),
    Build(BuildParams),
}

impl CategoryParams {
    fn defaults_for(category: Category) -> Self {
        match category {
            Category::Core => CategoryParams::Core(CoreParams::default()),
            Category::Routing => CategoryParams::Routing(RoutingParams::default()),
            Category::Image => CategoryParams::Image(ImageParams::default()),
            Category::Template => CategoryParams::Template(TemplateParams::default()),
            Category::Data => CategoryParams::Data(DataParams::default()),
            Category::Build => CategoryParams::Build(BuildParams::default()),
        }
    }

    fn parse(category: Category, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match category {
            Category::Core => CategoryParams::Core(serde_json::from_value(value)?),
            Category::Routing => CategoryParams::Routing(serde_json::from_value(value)?),
            Category::Image => CategoryParams::Image(serde_json::from_value(value)?),
            Category::Template => CategoryParams::Template(serde_json::from_value(value)?),
            Category::Data => CategoryParams::Data(serde_json::from_value(value)?),
            Category::Build => CategoryParams::Build(serde_json::from_value(value)?),
        })
    }

    pub fn category(&self) -> Category {
        match self {
            CategoryParams::Core(_) => Category::Core,
            CategoryParams::Routing(_) => Category::Routing,
            CategoryParams::Image(_) => Category::Image,
            CategoryParams::Template(_) => Category::Template,
            CategoryParams::Data(_) => Category::Data,
            CategoryParams::Build(_) => Category::Build,
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            CategoryParams::Core(p) => {
                if !p.float_tolerance.is_finite() || p.float_tolerance < 0.0 {
                    return Err("float_tolerance must be a finite, non-negative number".into());
                }
                Ok(())
            }
            CategoryParams::Routing(p) => {
                if p.endpoints.is_empty() {
                    return Err("no endpoints configured".into());
                }
                p.endpoints.iter().try_for_each(|e| e.resolve().map(|_| ()))
            }
            CategoryParams::Image(p) => {
                if p.sources.is_empty() {
                    return Err("no image sources configured".into());
                }
                if let Some((w, h)) = p.expected_size {
                    if w == 0 || h == 0 {
                        return Err("expected_size must be non-zero".into());
                    }
                }
                p.sources.iter().try_for_each(ArtifactSource::validate)
            }
            CategoryParams::Template(p) => {
                if p.sources.is_empty() {
                    return Err("no markup sources configured".into());
                }
                p.sources.iter().try_for_each(ArtifactSource::validate)
            }
            CategoryParams::Data(p) => {
                if p.artifacts.is_empty() {
                    return Err("no data artifacts configured".into());
                }
                for artifact in &p.artifacts {
                    if artifact.name.trim().is_empty() {
                        return Err("data artifact name must not be empty".into());
                    }
                    artifact.source.validate()?;
                    Regex::new(&artifact.pattern).map_err(|e| {
                        format!("artifact `{}` has an invalid pattern: {}", artifact.name, e)
                    })?;
                }
                Ok(())
            }
            CategoryParams::Build(_) => Ok(()),
        }
    }
}

/// A critical-difference category as configured: sub-check names plus parameters.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryRule {
    /// Required sub-checks, quoted to the oracle (e.g. "Algorithm correctness", "clippy").
    pub checks: Vec<String>,

    #[serde(flatten)]
    pub params: CategoryParams,
}

impl CategoryRule {
    pub fn new(params: CategoryParams) -> Self {
        Self {
            checks: Vec::new(),
            params,
        }
    }

    pub fn with_check(mut self, check: impl Into<String>) -> Self {
        self.checks.push(check.into());
        self
    }

    pub fn category(&self) -> Category {
        self.params.category()
    }

    pub fn has_check(&self, name: &str) -> bool {
        self.checks.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    fn from_value(category: Category, value: Value) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidCategory {
            category: category.to_string(),
            reason,
        };

        let rule = match value {
            Value::Array(_) => {
                let checks: Vec<String> =
                    serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
                CategoryRule {
                    checks,
                    params: CategoryParams::defaults_for(category),
                }
            }
            Value::Object(mut map) => {
                let checks = match map.remove("checks") {
                    Some(v) => serde_json::from_value(v).map_err(|e| invalid(e.to_string()))?,
                    None => Vec::new(),
                };
                let params = CategoryParams::parse(category, Value::Object(map))
                    .map_err(|e| invalid(e.to_string()))?;
                CategoryRule { checks, params }
            }
            other => {
                return Err(invalid(format!(
                    "expected a list of checks or an object, got {}",
                    other
                )))
            }
        };

        rule.params.validate().map_err(invalid)?;
        Ok(rule)
    }
}

// ---------------------------------------------------------------------------
// Rule set
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDocument {
    #[serde(default)]
    ignorable_differences: Vec<String>,

    #[serde(default)]
    lint_policy: Option<LintPolicy>,

    #[serde(default)]
    critical_differences: BTreeMap<String, Value>,
}

/// Resolved, validated rules for one migration job.
///
/// Immutable once built; shared by reference across the attempts of a job.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RuleSet {
    #[serde(rename = "ignorable_differences")]
    ignorable: Vec<String>,

    #[serde(rename = "lint_policy", skip_serializing_if = "Option::is_none")]
    lint_policy: Option<LintPolicy>,

    #[serde(rename = "critical_differences")]
    critical: BTreeMap<Category, CategoryRule>,

    /// Categories this layer withdraws from the layers below it.
    #[serde(skip)]
    removed: BTreeSet<Category>,
}

impl RuleSet {
    /// Rule set with no categories and no ignorable differences.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse and validate a rule document.
    ///
    /// `source_name` is only used in error messages.
    pub fn from_json_str(text: &str, source_name: &str) -> Result<Self, ConfigError> {
        let doc: RuleDocument =
            serde_json::from_str(text).map_err(|e| ConfigError::MalformedRuleDocument {
                source_name: source_name.to_string(),
                reason: e.to_string(),
            })?;

        let mut critical = BTreeMap::new();
        let mut removed = BTreeSet::new();
        for (name, value) in doc.critical_differences {
            let category: Category = name.parse()?;
            if value.is_null() {
                removed.insert(category);
                continue;
            }
            critical.insert(category, CategoryRule::from_value(category, value)?);
        }

        Ok(Self {
            ignorable: doc.ignorable_differences,
            lint_policy: doc.lint_policy,
            critical,
            removed,
        })
    }

    /// Add or replace a category (builder pattern).
    pub fn with_category(mut self, rule: CategoryRule) -> Self {
        self.critical.insert(rule.category(), rule);
        self
    }

    pub fn with_ignorable(mut self, pattern: impl Into<String>) -> Self {
        self.ignorable.push(pattern.into());
        self
    }

    pub fn with_lint_policy(mut self, policy: LintPolicy) -> Self {
        self.lint_policy = Some(policy);
        self
    }

    /// Overlay `upper` on top of `self`.
    ///
    /// Categories: last writer wins per category key, and a category the
    /// upper layer set to `null` is dropped. Ignorable differences: union,
    /// first occurrence order. Lint policy: the upper layer's explicit value
    /// wins.
    pub fn merge(mut self, upper: RuleSet) -> RuleSet {
        for category in &upper.removed {
            self.critical.remove(category);
        }
        for pattern in upper.ignorable {
            if !self.ignorable.contains(&pattern) {
                self.ignorable.push(pattern);
            }
        }
        if upper.lint_policy.is_some() {
            self.lint_policy = upper.lint_policy;
        }
        self.critical.extend(upper.critical);
        self
    }

    /// Effective lint policy.
    ///
    /// An explicit `lint_policy` wins; otherwise lint failures block only when
    /// the `build` category requires the `clippy` sub-check.
    pub fn lint_policy(&self) -> LintPolicy {
        if let Some(policy) = self.lint_policy {
            return policy;
        }
        match self.critical.get(&Category::Build) {
            Some(rule) if rule.has_check("clippy") => LintPolicy::Blocking,
            _ => LintPolicy::Advisory,
        }
    }

    pub fn requires(&self, category: Category) -> bool {
        self.critical.contains_key(&category)
    }

    pub fn get(&self, category: Category) -> Option<&CategoryRule> {
        self.critical.get(&category)
    }

    /// Configured categories in stable order.
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.critical.keys().copied()
    }

    pub fn rules(&self) -> impl Iterator<Item = &CategoryRule> {
        self.critical.values()
    }

    pub fn ignorable(&self) -> &[String] {
        &self.ignorable
    }

    /// Whether `text` mentions any ignorable difference (case-insensitive).
    pub fn is_ignorable(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.ignorable
            .iter()
            .any(|pattern| !pattern.is_empty() && lower.contains(&pattern.to_lowercase()))
    }
}
