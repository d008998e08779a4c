//! HTTP client for a translation oracle service.
//!
//! The service receives the [`TranslationContext`] as a JSON POST body and
//! answers with either explicit files:
//!
//! ```json
//! {"files": {"Cargo.toml": "...", "src/main.rs": "..."},
//!  "model": "...", "usage": {"prompt_tokens": 1200, "completion_tokens": 800}}
//! ```
//!
//! or a markdown completion containing ```` ```rust ```` and ```` ```toml ````
//! fences: `{"completion": "..."}`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::extract::extract_files;
use super::{OracleError, TranslationOracle};
use crate::domain::{Candidate, OracleUsage, TranslationContext};

/// Per-million-token prices used when the service reports no cost.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Pricing {
    pub input_per_mtok_usd: f64,
    pub output_per_mtok_usd: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            input_per_mtok_usd: 3.0,
            output_per_mtok_usd: 15.0,
        }
    }
}

impl Pricing {
    pub fn estimate(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 * self.input_per_mtok_usd
            + completion_tokens as f64 * self.output_per_mtok_usd)
            / 1_000_000.0
    }
}

#[derive(Debug, Default, Deserialize)]
struct ResponseUsage {
    #[serde(default, alias = "input_tokens")]
    prompt_tokens: u64,
    #[serde(default, alias = "output_tokens")]
    completion_tokens: u64,
    #[serde(default)]
    cost_usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OracleResponse {
    #[serde(default)]
    files: Option<BTreeMap<String, String>>,
    #[serde(default)]
    completion: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<ResponseUsage>,
}

/// Whether an HTTP status is worth retrying.
fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Oracle reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    pricing: Pricing,
}

impl HttpOracle {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("transmigrate/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OracleError::Fatal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token: None,
            pricing: Pricing::default(),
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn candidate_from(&self, response: OracleResponse) -> Result<Candidate, OracleError> {
        let files = match (response.files, response.completion) {
            (Some(files), _) if !files.is_empty() => files,
            (_, Some(completion)) => extract_files(&completion).map_err(OracleError::Fatal)?,
            _ => {
                return Err(OracleError::Fatal(
                    "oracle response contains neither files nor a completion".into(),
                ))
            }
        };

        let usage = response.usage.unwrap_or_default();
        let cost_usd = usage.cost_usd.unwrap_or_else(|| {
            self.pricing
                .estimate(usage.prompt_tokens, usage.completion_tokens)
        });

        Ok(Candidate::new(files).with_usage(OracleUsage {
            model: response.model,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            latency_ms: 0,
            cost_usd,
            calls: 1,
        }))
    }
}

#[async_trait]
impl TranslationOracle for HttpOracle {
    async fn translate(&self, ctx: &TranslationContext) -> Result<Candidate, OracleError> {
        let mut request = self.client.post(&self.endpoint).json(ctx);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OracleError::Transient(e.to_string()))?;

        let status = response.status();
        debug!(attempt = ctx.attempt, status = status.as_u16(), "oracle responded");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("oracle returned {}: {}", status, body.trim());
            return Err(if is_transient_status(status) {
                OracleError::Transient(message)
            } else {
                OracleError::Fatal(message)
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| OracleError::Transient(e.to_string()))?;
        let parsed: OracleResponse = serde_json::from_slice(&body)
            .map_err(|e| OracleError::Fatal(format!("undecodable oracle response: {}", e)))?;

        self.candidate_from(parsed)
    }
}
