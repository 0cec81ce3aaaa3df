//! Retrying HTTP transport shared by all exchange adapters.
//!
//! One `reqwest::Client` per adapter instance; the client carries no
//! per-request mutable state and is safe to share across concurrent window
//! fetches. Transport and status failures are retried with exponential
//! backoff; a malformed body is a final failure because retrying cannot fix
//! a schema mismatch.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("malformed response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Minimal GET-a-JSON-document capability. Adapters depend on this trait so
/// tests can substitute canned payloads for the network.
#[async_trait]
pub trait HttpGet: Send + Sync {
    async fn get_json(&self, url: &str, params: &[(String, String)]) -> Result<Value, HttpError>;
}

pub struct RetryClient {
    client: reqwest::Client,
    max_retries: u32,
}

impl RetryClient {
    pub fn new(timeout: Duration, max_retries: u32) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| HttpError::ClientBuild(err.to_string()))?;
        Ok(Self {
            client,
            max_retries,
        })
    }

    async fn get_text(&self, url: &str, params: &[(String, String)]) -> Result<String, HttpError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|err| HttpError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|err| HttpError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        })
    }
}

#[async_trait]
impl HttpGet for RetryClient {
    async fn get_json(&self, url: &str, params: &[(String, String)]) -> Result<Value, HttpError> {
        let mut attempt: u32 = 0;
        loop {
            match self.get_text(url, params).await {
                Ok(body) => {
                    debug!(component = "http", event = "http.ok", url, attempt = attempt + 1);
                    // Final either way: a body that fails to parse will not
                    // improve on a retry.
                    return serde_json::from_str(&body).map_err(|err| HttpError::Decode {
                        url: url.to_string(),
                        message: err.to_string(),
                    });
                }
                Err(err) if attempt >= self.max_retries => {
                    warn!(
                        component = "http",
                        event = "http.exhausted",
                        url,
                        attempts = attempt + 1,
                        error = %err
                    );
                    return Err(err);
                }
                Err(err) => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        component = "http",
                        event = "http.retry",
                        url,
                        attempt = attempt + 1,
                        max_attempts = self.max_retries + 1,
                        delay_s = delay.as_secs(),
                        error = %err
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// `2^attempt` seconds, attempt 0-indexed, shift capped to keep the delay
/// finite on absurd retry budgets.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(6))
}
