//! Role-based model registry.
//!
//! Every configured model becomes one [`ModelDescriptor`], shared behind an `Arc`
//! for the lifetime of the engine. Identity and policy fields are immutable; the
//! runtime statistics sit behind a per-descriptor mutex because parallel candidates
//! may complete against the same descriptor at the same time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::{ModelEntry, OrchestratorConfig};
use crate::{Error, ErrorContext, Result};

/// Priority tag governing selection and fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    Primary,
    Duplicate,
    Reserve,
    Fallback,
}

impl ModelRole {
    /// Order in which non-primary roles are walked by the fallback chain.
    pub const FALLBACK_ORDER: [ModelRole; 3] =
        [ModelRole::Reserve, ModelRole::Duplicate, ModelRole::Fallback];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Primary => "primary",
            ModelRole::Duplicate => "duplicate",
            ModelRole::Reserve => "reserve",
            ModelRole::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for ModelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable runtime statistics of one model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ModelStats {
    /// Latency of the most recent successful call; `0.0` until the model is first used.
    pub last_response_time_secs: f64,
    pub success_count: u64,
    pub error_count: u64,
}

/// Identity and policy for one backend model.
#[derive(Debug)]
pub struct ModelDescriptor {
    pub name: String,
    pub provider: String,
    pub role: ModelRole,
    pub max_tokens: u32,
    pub context_window: u32,
    pub temperature: f32,
    pub top_p: f32,
    enabled: AtomicBool,
    stats: Mutex<ModelStats>,
}

impl ModelDescriptor {
    pub fn new(provider: impl Into<String>, role: ModelRole, entry: &ModelEntry) -> Self {
        Self {
            name: entry.name.clone(),
            provider: provider.into(),
            role,
            max_tokens: entry.max_tokens,
            context_window: entry.context_window,
            temperature: entry.temperature,
            top_p: entry.top_p,
            enabled: AtomicBool::new(entry.enabled),
            stats: Mutex::new(ModelStats::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn stats(&self) -> ModelStats {
        match self.stats.lock() {
            Ok(st) => *st,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn last_response_time_secs(&self) -> f64 {
        self.stats().last_response_time_secs
    }

    pub(crate) fn record_success(&self, response_time_secs: f64) {
        if let Ok(mut st) = self.stats.lock() {
            st.last_response_time_secs = response_time_secs;
            st.success_count = st.success_count.saturating_add(1);
        }
    }

    pub(crate) fn record_failure(&self) {
        if let Ok(mut st) = self.stats.lock() {
            st.error_count = st.error_count.saturating_add(1);
        }
    }
}

/// Per-model counters reported by [`ModelRegistry::performance_stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelPerformance {
    pub name: String,
    pub provider: String,
    pub role: ModelRole,
    pub enabled: bool,
    #[serde(flatten)]
    pub stats: ModelStats,
}

/// In-memory table of descriptors keyed by name.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<Arc<ModelDescriptor>>,
    by_name: HashMap<String, Arc<ModelDescriptor>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from a validated configuration.
    ///
    /// Models are registered role by role, in the order of the role-assignment
    /// table; models that no role names are appended with role `Fallback`.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self> {
        let roles = &config.llm.model_roles;
        let mut registry = Self::new();

        let assignments = [
            (ModelRole::Primary, &roles.primary),
            (ModelRole::Duplicate, &roles.duplicate),
            (ModelRole::Reserve, &roles.reserve),
            (ModelRole::Fallback, &roles.fallback),
        ];
        for (role, names) in assignments {
            for name in names {
                let (provider, entry) = config.find_model(name).ok_or_else(|| {
                    Error::validation_with_context(
                        format!("model '{}' is not declared by any provider", name),
                        ErrorContext::new()
                            .with_field_path(format!("llm.model_roles.{}", role))
                            .with_source("model_registry"),
                    )
                })?;
                registry.register(ModelDescriptor::new(provider, role, entry))?;
            }
        }

        for (provider, entry) in config.model_entries() {
            if !registry.contains(&entry.name) {
                registry.register(ModelDescriptor::new(provider, ModelRole::Fallback, entry))?;
            }
        }

        Ok(registry)
    }

    pub fn register(&mut self, descriptor: ModelDescriptor) -> Result<Arc<ModelDescriptor>> {
        if self.by_name.contains_key(&descriptor.name) {
            return Err(Error::validation_with_context(
                format!("model '{}' is already registered", descriptor.name),
                ErrorContext::new().with_source("model_registry"),
            ));
        }
        let descriptor = Arc::new(descriptor);
        self.by_name
            .insert(descriptor.name.clone(), Arc::clone(&descriptor));
        self.models.push(Arc::clone(&descriptor));
        Ok(descriptor)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Name lookup. The returned `Arc` always points at the same descriptor.
    pub fn get_model_by_name(&self, name: &str) -> Option<Arc<ModelDescriptor>> {
        self.by_name.get(name).cloned()
    }

    /// All enabled descriptors with role `Primary`, in registration order.
    pub fn get_primary_models(&self) -> Vec<Arc<ModelDescriptor>> {
        self.enabled_with_role(ModelRole::Primary).collect()
    }

    /// Enabled non-primary descriptors: Reserve, then Duplicate, then Fallback.
    pub fn get_fallback_models(&self) -> Vec<Arc<ModelDescriptor>> {
        ModelRole::FALLBACK_ORDER
            .iter()
            .flat_map(|role| self.enabled_with_role(*role))
            .collect()
    }

    pub fn models(&self) -> &[Arc<ModelDescriptor>] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn performance_stats(&self) -> Vec<ModelPerformance> {
        self.models
            .iter()
            .map(|m| ModelPerformance {
                name: m.name.clone(),
                provider: m.provider.clone(),
                role: m.role,
                enabled: m.is_enabled(),
                stats: m.stats(),
            })
            .collect()
    }

    fn enabled_with_role(&self, role: ModelRole) -> impl Iterator<Item = Arc<ModelDescriptor>> + '_ {
        self.models
            .iter()
            .filter(move |m| m.role == role && m.is_enabled())
            .cloned()
    }
}
