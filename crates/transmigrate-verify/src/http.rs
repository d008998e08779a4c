//! HTTP access to a serving program: readiness polling and probes.

use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, StatusCode};
use tracing::debug;
use transmigrate_core::rules::ResolvedEndpoint;

use crate::observation::{HttpResponse, ObservationError};
use crate::process::ServerGuard;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// HTTP client bound to one server's base URL.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProbe {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ObservationError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("transmigrate-verify/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                ObservationError::Request(format!("failed to create HTTP client: {}", e))
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Poll `ready_path` until any HTTP response arrives.
    ///
    /// Fails early when `server` exits, and after `startup_timeout`.
    pub async fn wait_ready(
        &self,
        mut server: Option<&mut ServerGuard>,
        ready_path: &str,
        startup_timeout: Duration,
    ) -> Result<(), ObservationError> {
        let url = format!("{}{}", self.base_url, ready_path);
        let started = Instant::now();
        loop {
            if let Some(server) = server.as_deref_mut() {
                if let Some(status) = server.exited() {
                    return Err(ObservationError::NotReady(format!(
                        "exited before becoming ready ({})",
                        status
                    )));
                }
            }

            match self.client.get(&url).send().await {
                Ok(response) => {
                    debug!(url = %url, status = response.status().as_u16(), "server ready");
                    return Ok(());
                }
                Err(e) => debug!(url = %url, error = %e, "server not ready yet"),
            }

            if started.elapsed() >= startup_timeout {
                return Err(ObservationError::NotReady(format!(
                    "no response from {} within {}s",
                    url,
                    startup_timeout.as_secs()
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Issue one request and capture status, content type and body.
    pub async fn request(
        &self,
        endpoint: &ResolvedEndpoint,
    ) -> Result<HttpResponse, ObservationError> {
        let method = Method::from_bytes(endpoint.method.as_bytes())
            .map_err(|e| ObservationError::Request(format!("{}: {}", endpoint, e)))?;
        let url = format!("{}{}", self.base_url, endpoint.path);

        let mut request = self.client.request(method, &url);
        if let Some(body) = &endpoint.body {
            request = request
                .header(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                )
                .body(body.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ObservationError::Request(format!("{}: {}", endpoint, e)))?;
        let status: StatusCode = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| ObservationError::Request(format!("{}: {}", endpoint, e)))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            content_type,
            body: body.to_vec(),
        })
    }
}
