use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::{ModelTransport, ProviderRequest, TransportError};
use crate::client::error_classification::classify_http_failure;
use crate::{Error, Result};

/// reqwest-backed transport. One instance is created per configured provider.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(
                std::env::var("AI_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ModelTransport for HttpTransport {
    async fn send(&self, request: &ProviderRequest) -> Result<Value> {
        let mut req = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            req = req.query(&request.query);
        }

        let start = std::time::Instant::now();
        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    message: format!("request to {} timed out", request.url),
                }
            } else {
                Error::Transport(TransportError::Http(e))
            }
        })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            let failure = classify_http_failure(status, &body);
            info!(
                http_status = status,
                error_class = failure.class,
                retryable = failure.retryable,
                duration_ms = start.elapsed().as_millis(),
                "provider request failed"
            );
            return Err(Error::Remote {
                status,
                class: failure.class.to_string(),
                message: body,
                retryable: failure.retryable,
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;
        debug!(
            http_status = status,
            duration_ms = start.elapsed().as_millis(),
            "provider request completed"
        );

        serde_json::from_str(&body).map_err(|e| Error::Remote {
            status,
            class: "malformed_response".to_string(),
            message: format!("Failed to parse response JSON: {}", e),
            retryable: true,
        })
    }
}
