//! HTTP client for the RedSys REST endpoint (`trataPeticionREST`).

use serde_json::Value;
use std::time::Duration;

use crate::error::RedsysError;
use crate::outbound::SignedRequest;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts signed requests to the gateway. One attempt per call, no retries.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl RestClient {
    pub fn new(url: impl Into<String>) -> Result<Self, RedsysError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| RedsysError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send `request` as JSON and return the gateway's reply.
    ///
    /// Non-2xx statuses are errors. A 2xx body that is not JSON comes back
    /// as `{"raw": <body>}`.
    pub async fn send(&self, request: &SignedRequest) -> Result<Value, RedsysError> {
        let resp = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| RedsysError::Http(format!("gateway request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RedsysError::Http(format!("failed to read gateway response: {e}")))?;

        if !status.is_success() {
            tracing::warn!(status = %status, url = %self.url, "gateway returned an error status");
            return Err(RedsysError::Http(format!("gateway returned {status}: {text}")));
        }

        tracing::debug!(status = %status, bytes = text.len(), "gateway response received");
        Ok(parse_body(&text))
    }
}

fn parse_body(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::json!({ "raw": text }))
}
