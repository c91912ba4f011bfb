//! Network transport seam between provider clients and the wire.

pub mod http;

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

pub use http::HttpTransport;

/// A fully built provider request: where to send it and what to send.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Value,
}

/// Executes provider requests and returns the decoded JSON body.
///
/// Implementations classify non-success responses into [`crate::Error::Remote`]
/// so the retry policy can tell rate limits from bad requests.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn send(&self, request: &ProviderRequest) -> Result<Value>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}
