//! API client for a running glove agent

use anyhow::{Context, Result};
use glove_lib::{GestureReading, HealthResponse, ReadinessResponse};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

/// API client for the glove agent
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid agent URL")?;

        Ok(Self { client, base_url })
    }

    async fn send(&self, path: &str) -> Result<Response> {
        let url = self.base_url.join(path).context("Invalid path")?;

        self.client
            .get(url)
            .send()
            .await
            .context("Failed to reach the agent")
    }

    /// Parse the body of a 2xx response, or of a 503 when `unavailable_ok`
    async fn parse<T: DeserializeOwned>(response: Response, unavailable_ok: bool) -> Result<T> {
        let status = response.status();
        if !(status.is_success() || (unavailable_ok && status == StatusCode::SERVICE_UNAVAILABLE)) {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Component health; an unhealthy agent still reports its components
    pub async fn health(&self) -> Result<HealthResponse> {
        Self::parse(self.send("healthz").await?, true).await
    }

    pub async fn readiness(&self) -> Result<ReadinessResponse> {
        Self::parse(self.send("readyz").await?, true).await
    }

    /// The newest gesture, or `None` before the first classification
    pub async fn latest_gesture(&self) -> Result<Option<GestureReading>> {
        let response = self.send("v1/gesture").await?;
        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return Ok(None);
        }
        Self::parse(response, false).await.map(Some)
    }
}
