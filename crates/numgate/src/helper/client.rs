//! HTTP client for the number helper.

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::config::HelperConfig;

use super::protocol::{AggregateRequest, AggregateResponse, HealthResponse};

#[derive(Debug, thiserror::Error)]
pub enum HelperError {
    #[error("failed to build helper client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("helper unreachable at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("helper returned {status} for {url}")]
    Status { url: String, status: StatusCode },
    #[error("invalid response from helper at {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("timed out after {0:?} waiting for helper to become healthy")]
    ReadinessTimeout(Duration),
}

#[derive(Debug, Clone)]
pub struct HelperClient {
    http: reqwest::Client,
    base_url: String,
    health_url: String,
}

impl HelperClient {
    pub fn new(config: &HelperConfig) -> Result<Self, HelperError> {
        let http = reqwest::Client::builder()
            .timeout(config.readiness_timeout)
            .build()
            .map_err(HelperError::Client)?;

        Ok(Self {
            http,
            base_url: config.base_url(),
            health_url: config.health_url(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Single health check. No retry.
    pub async fn health(&self) -> Result<HealthResponse, HelperError> {
        let url = self.health_url.clone();
        let request = self.http.get(&url);
        Self::execute(url, request).await
    }

    pub async fn aggregate(
        &self,
        request: &AggregateRequest,
    ) -> Result<AggregateResponse, HelperError> {
        let url = format!("{}/aggregate", self.base_url);
        let request = self.http.post(&url).json(request);
        Self::execute(url, request).await
    }

    /// Poll `health()` every `poll_interval` until it succeeds or `timeout`
    /// has elapsed. Individual failures are only logged.
    pub async fn wait_until_healthy(
        &self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<HealthResponse, HelperError> {
        let started_at = Instant::now();
        let mut attempt: u32 = 0;

        while let Some(remaining) = timeout.checked_sub(started_at.elapsed()) {
            if remaining.is_zero() {
                break;
            }
            attempt += 1;

            match tokio::time::timeout(remaining, self.health()).await {
                Ok(Ok(health)) => {
                    tracing::info!(
                        attempt,
                        elapsed_ms = started_at.elapsed().as_millis() as u64,
                        status = health.status().unwrap_or("unknown"),
                        "Helper is healthy"
                    );
                    return Ok(health);
                }
                Ok(Err(e)) => {
                    tracing::debug!(attempt, error = %e, "Helper not ready yet");
                }
                Err(_) => {
                    tracing::debug!(attempt, "Helper health check timed out");
                    break;
                }
            }

            tokio::time::sleep(poll_interval).await;
        }

        Err(HelperError::ReadinessTimeout(timeout))
    }

    async fn execute<T: DeserializeOwned>(
        url: String,
        request: reqwest::RequestBuilder,
    ) -> Result<T, HelperError> {
        let response = match request.send().await {
            Ok(response) => response,
            Err(source) => return Err(HelperError::Unreachable { url, source }),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(HelperError::Status { url, status });
        }

        match response.json::<T>().await {
            Ok(body) => Ok(body),
            Err(source) => Err(HelperError::Decode { url, source }),
        }
    }
}
