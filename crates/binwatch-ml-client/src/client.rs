//! Inference service HTTP client.

use std::path::Path;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use binwatch_models::BoundingBox;

use crate::error::{MlError, MlResult};
use crate::types::{
    DetectRequest, DetectResponse, HealthResponse, OverflowRequest, OverflowResponse,
    OverflowVerdict,
};

/// Configuration for the inference client.
#[derive(Debug, Clone)]
pub struct InferenceClientConfig {
    /// Base URL of the inference service
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
}

impl Default for InferenceClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
        }
    }
}

impl InferenceClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("INFERENCE_SERVICE_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("INFERENCE_SERVICE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("INFERENCE_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }
}

/// Client for the bin detector and overflow classifier.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: Client,
    config: InferenceClientConfig,
}

impl InferenceClient {
    /// Create a new inference client.
    pub fn new(config: InferenceClientConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MlError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> MlResult<Self> {
        Self::new(InferenceClientConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Check if the inference service is healthy.
    pub async fn health_check(&self) -> MlResult<bool> {
        let url = self.url("/health");

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                debug!(models = ?health.models, "Inference service health: {}", health.status);
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Inference service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Inference service health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Run the bin detector on one frame.
    pub async fn detect(
        &self,
        frame_path: impl AsRef<Path>,
        confidence: f32,
    ) -> MlResult<Vec<BoundingBox>> {
        let request = DetectRequest {
            image_path: frame_path.as_ref().to_string_lossy().to_string(),
            confidence,
        };
        let response: DetectResponse = self.post_json("/detect", &request).await?;

        let boxes: Vec<BoundingBox> = response.detections.into_iter().map(Into::into).collect();
        if let Some(bad) = boxes.iter().find(|b| !(0.0..=1.0).contains(&b.confidence)) {
            return Err(MlError::InvalidResponse(format!(
                "detector returned confidence {} outside [0, 1]",
                bad.confidence
            )));
        }
        Ok(boxes)
    }

    /// Run the overflow classifier on one frame and threshold the result.
    pub async fn classify_overflow(
        &self,
        frame_path: impl AsRef<Path>,
        threshold: f32,
    ) -> MlResult<OverflowVerdict> {
        let request = OverflowRequest {
            image_path: frame_path.as_ref().to_string_lossy().to_string(),
        };
        let response: OverflowResponse = self.post_json("/classify/overflow", &request).await?;
        Ok(response.verdict(threshold))
    }

    /// POST a JSON body with retries and decode the JSON reply.
    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> MlResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.url(path);
        debug!("Sending inference request to {}", url);

        let http = &self.http;
        let url = url.as_str();
        let timeout_secs = self.config.timeout.as_secs();

        let response = self
            .with_retry(|| async move {
                let response = http.post(url).json(body).send().await.map_err(|e| {
                    if e.is_timeout() {
                        MlError::Timeout(timeout_secs)
                    } else {
                        MlError::Network(e)
                    }
                })?;

                match response.status() {
                    s if s.is_success() => Ok(response),
                    status @ (StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY) => Err(
                        MlError::ServiceUnavailable(format!("{} returned {}", path, status)),
                    ),
                    status => {
                        let body = response.text().await.unwrap_or_default();
                        Err(MlError::RequestFailed(format!(
                            "Inference service returned {}: {}",
                            status, body
                        )))
                    }
                }
            })
            .await?;

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| MlError::InvalidResponse(format!("{}: {}", path, e)))
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> MlResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = MlResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Inference request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
