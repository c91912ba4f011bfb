//! Fallback chain: ordered failover to non-primary models.

use std::collections::HashSet;
use std::sync::Arc;

use crate::pipeline::select::Blacklists;
use crate::registry::{ModelDescriptor, ModelRegistry};

/// Walks Reserve, then Duplicate, then Fallback models, handing out each eligible
/// model at most once per request.
#[derive(Debug)]
pub struct FallbackChain {
    candidates: Vec<Arc<ModelDescriptor>>,
    attempted: HashSet<String>,
}

impl FallbackChain {
    pub fn new(registry: &ModelRegistry) -> Self {
        Self {
            candidates: registry.get_fallback_models(),
            attempted: HashSet::new(),
        }
    }

    /// Record a model tried outside the chain so it is not handed out again.
    pub fn mark_attempted(&mut self, model: &str) {
        self.attempted.insert(model.to_string());
    }

    pub fn was_attempted(&self, model: &str) -> bool {
        self.attempted.contains(model)
    }

    pub fn attempted_count(&self) -> usize {
        self.attempted.len()
    }

    /// Next candidate not yet attempted, still enabled and not blacklisted.
    ///
    /// Eligibility is re-checked on every step: a model blacklisted mid-request is
    /// skipped from then on.
    pub fn next(&mut self, blacklists: &Blacklists, json_mode: bool) -> Option<Arc<ModelDescriptor>> {
        let model = self.candidates.iter().find(|m| {
            !self.attempted.contains(&m.name)
                && m.is_enabled()
                && !blacklists.excludes(&m.name, json_mode)
        })?;
        let model = Arc::clone(model);
        self.attempted.insert(model.name.clone());
        Some(model)
    }
}
