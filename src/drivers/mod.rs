//! Provider client pool.
//!
//! Two wire shapes are modeled as a closed set of variants rather than a driver
//! hierarchy: an OpenAI-compatible chat completion endpoint and a Google-style
//! generate-content endpoint. Adding a shape means adding a variant and a request
//! builder next to [`openai`] and [`gemini`].

pub mod gemini;
pub mod openai;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::OrchestratorConfig;
use crate::registry::ModelDescriptor;
use crate::structured::ResponseFormat;
use crate::transport::{HttpTransport, ModelTransport, ProviderRequest};
use crate::{Error, ErrorContext, Result};

/// Wire shape spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[serde(alias = "openai")]
    OpenAiCompatible,
    #[serde(alias = "gemini")]
    Google,
}

impl ProviderKind {
    /// Providers named after Gemini/Google speak the generate-content shape;
    /// everything else is treated as OpenAI-compatible.
    pub fn infer_from_name(provider_name: &str) -> Self {
        let lower = provider_name.to_lowercase();
        if lower.contains("gemini") || lower.contains("google") {
            ProviderKind::Google
        } else {
            ProviderKind::OpenAiCompatible
        }
    }

    /// Google-style endpoints get a short pause before every request to stay
    /// inside their per-minute limits.
    pub fn default_request_delay_ms(&self) -> u64 {
        match self {
            ProviderKind::OpenAiCompatible => 0,
            ProviderKind::Google => 1_000,
        }
    }
}

/// Network client for one configured provider.
pub struct ProviderClient {
    name: String,
    kind: ProviderKind,
    base_url: String,
    api_key: Option<String>,
    request_delay: Duration,
    transport: RwLock<Option<Arc<dyn ModelTransport>>>,
}

impl ProviderClient {
    pub fn new(
        name: impl Into<String>,
        kind: ProviderKind,
        base_url: impl Into<String>,
        api_key: Option<String>,
        request_delay: Duration,
        transport: Arc<dyn ModelTransport>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            request_delay,
            transport: RwLock::new(Some(transport)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn request_delay(&self) -> Duration {
        self.request_delay
    }

    pub fn build_request(
        &self,
        prompt: &str,
        model: &ModelDescriptor,
        format: Option<&ResponseFormat>,
    ) -> ProviderRequest {
        match self.kind {
            ProviderKind::OpenAiCompatible => {
                openai::build_request(&self.base_url, self.api_key.as_deref(), prompt, model, format)
            }
            ProviderKind::Google => {
                gemini::build_request(&self.base_url, self.api_key.as_deref(), prompt, model, format)
            }
        }
    }

    pub fn parse_response(&self, body: &Value) -> Result<String> {
        match self.kind {
            ProviderKind::OpenAiCompatible => openai::parse_response(body),
            ProviderKind::Google => gemini::parse_response(body),
        }
    }

    /// One request/response exchange. No retry happens here.
    pub async fn complete(
        &self,
        prompt: &str,
        model: &ModelDescriptor,
        format: Option<&ResponseFormat>,
    ) -> Result<String> {
        let transport = self.transport()?;

        if !self.request_delay.is_zero() {
            debug!(
                provider = self.name.as_str(),
                delay_ms = self.request_delay.as_millis() as u64,
                "pre-call delay"
            );
            tokio::time::sleep(self.request_delay).await;
        }

        let request = self.build_request(prompt, model, format);
        let body = transport.send(&request).await?;
        self.parse_response(&body)
    }

    /// Release the underlying client. Subsequent calls fail without network activity.
    pub fn close(&self) {
        if let Ok(mut slot) = self.transport.write() {
            slot.take();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.transport
            .read()
            .map(|slot| slot.is_none())
            .unwrap_or(true)
    }

    fn transport(&self) -> Result<Arc<dyn ModelTransport>> {
        let slot = self.transport.read().map_err(|_| {
            Error::runtime_with_context(
                "provider client lock poisoned",
                ErrorContext::new().with_source("provider_client"),
            )
        })?;
        let transport: Option<Arc<dyn ModelTransport>> = (*slot).clone();
        transport.ok_or_else(|| {
            Error::runtime_with_context(
                format!("provider '{}' is closed", self.name),
                ErrorContext::new().with_source("provider_client"),
            )
        })
    }
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// One client per configured provider, created at startup.
#[derive(Debug, Default)]
pub struct ProviderPool {
    clients: HashMap<String, Arc<ProviderClient>>,
}

impl ProviderPool {
    /// Build a client for every provider in the configuration.
    ///
    /// `transport_override` replaces the HTTP transport of every provider; it is
    /// how tests and embedders route calls through a custom [`ModelTransport`].
    pub fn from_config(
        config: &OrchestratorConfig,
        transport_override: Option<Arc<dyn ModelTransport>>,
    ) -> Result<Self> {
        let mut clients = HashMap::new();
        for (name, provider) in &config.providers {
            let transport: Arc<dyn ModelTransport> = match &transport_override {
                Some(t) => Arc::clone(t),
                None => Arc::new(HttpTransport::new(provider.timeout())?),
            };
            let kind = provider.resolved_kind(name);
            let client = ProviderClient::new(
                name.clone(),
                kind,
                provider.base_url.clone(),
                provider.api_key.clone(),
                provider.request_delay(name),
                transport,
            );
            info!(provider = name.as_str(), kind = ?kind, "provider client created");
            clients.insert(name.clone(), Arc::new(client));
        }
        Ok(Self { clients })
    }

    pub fn get(&self, provider: &str) -> Option<Arc<ProviderClient>> {
        self.clients.get(provider).cloned()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn close(&self) {
        for client in self.clients.values() {
            client.close();
        }
    }
}
