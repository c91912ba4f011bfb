//! Typed configuration document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::drivers::ProviderKind;

/// Root of the configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub llm: LlmSection,
    pub providers: BTreeMap<String, ProviderConfig>,
}

/// Engine-wide policy: roles, strategy, and the tuning knobs of each component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    pub default_provider: String,
    #[serde(default)]
    pub model_roles: ModelRoles,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub parallel: Option<ParallelConfig>,
    #[serde(default = "default_fastest_ttl_secs")]
    pub fastest_cache_ttl_secs: u64,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub blacklist: BlacklistSettings,
    #[serde(default)]
    pub security: SecuritySettings,
}

/// Role assignment table: `role -> [model names]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRoles {
    #[serde(default)]
    pub primary: Vec<String>,
    #[serde(default)]
    pub duplicate: Vec<String>,
    #[serde(default)]
    pub reserve: Vec<String>,
    #[serde(default)]
    pub fallback: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Single,
    BestOfTwo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    pub models: Vec<String>,
    #[serde(default)]
    pub evaluator_model: Option<String>,
    #[serde(default = "default_parallel_timeout_secs")]
    pub timeout_secs: f64,
}

impl ParallelConfig {
    /// Upper bound accepted for `timeout_secs`.
    pub const MAX_TIMEOUT_SECS: f64 = 86_400.0;

    /// Overall budget, clamped to [`Self::MAX_TIMEOUT_SECS`].
    pub fn timeout(&self) -> Duration {
        let secs = if self.timeout_secs.is_finite() {
            self.timeout_secs.clamp(0.0, Self::MAX_TIMEOUT_SECS)
        } else {
            Self::MAX_TIMEOUT_SECS
        };
        Duration::from_secs_f64(secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Fraction of the computed delay used as +/- jitter.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

/// Blacklist expiry policy. `None` keeps entries for the engine's lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlacklistSettings {
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySettings {
    #[serde(default = "default_max_prompt_bytes")]
    pub max_prompt_bytes: usize,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            max_prompt_bytes: default_max_prompt_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Wire shape. Inferred from the provider name when omitted.
    #[serde(default)]
    pub kind: Option<ProviderKind>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Fixed delay before every request; defaults depend on the provider kind.
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    /// `group -> [model entries]`
    #[serde(default)]
    pub models: BTreeMap<String, Vec<ModelEntry>>,
}

impl ProviderConfig {
    pub fn resolved_kind(&self, provider_name: &str) -> ProviderKind {
        self.kind
            .unwrap_or_else(|| ProviderKind::infer_from_name(provider_name))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(60))
    }

    pub fn request_delay(&self, provider_name: &str) -> Duration {
        let ms = self
            .request_delay_ms
            .unwrap_or_else(|| self.resolved_kind(provider_name).default_request_delay_ms());
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl OrchestratorConfig {
    /// Iterate `(provider, model)` pairs in document order.
    pub fn model_entries(&self) -> impl Iterator<Item = (&str, &ModelEntry)> {
        self.providers.iter().flat_map(|(provider, cfg)| {
            cfg.models
                .values()
                .flatten()
                .map(move |entry| (provider.as_str(), entry))
        })
    }

    pub fn find_model(&self, name: &str) -> Option<(&str, &ModelEntry)> {
        self.model_entries().find(|(_, entry)| entry.name == name)
    }
}

fn default_fastest_ttl_secs() -> u64 {
    60
}

fn default_parallel_timeout_secs() -> f64 {
    60.0
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> f64 {
    0.25
}

fn default_max_prompt_bytes() -> usize {
    100 * 1024
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_context_window() -> u32 {
    8192
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    1.0
}

fn default_enabled() -> bool {
    true
}
