//! Model selection state: the fastest-model cache and the two blacklists.
//!
//! Both are owned by one engine instance; nothing here is process-global.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::registry::{ModelDescriptor, ModelRegistry};

/// Which failure class put a model on a blacklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlacklistKind {
    /// Returned non-JSON output under JSON mode. Excluded from JSON-mode requests only.
    Json,
    /// Reported an out-of-credit condition. Excluded from every request.
    Quota,
}

/// Sorted blacklist membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlacklistSnapshot {
    pub json: Vec<String>,
    pub quota: Vec<String>,
}

/// Advisory exclusion sets. Entries never leave the registry; they are only skipped.
#[derive(Debug, Default)]
pub struct Blacklists {
    json: RwLock<HashMap<String, Instant>>,
    quota: RwLock<HashMap<String, Instant>>,
    ttl: Option<Duration>,
}

impl Blacklists {
    /// `ttl = None` keeps entries until [`Blacklists::remove`] is called.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            json: RwLock::default(),
            quota: RwLock::default(),
            ttl,
        }
    }

    fn set(&self, kind: BlacklistKind) -> &RwLock<HashMap<String, Instant>> {
        match kind {
            BlacklistKind::Json => &self.json,
            BlacklistKind::Quota => &self.quota,
        }
    }

    fn live(&self, added: Instant) -> bool {
        self.ttl.map_or(true, |ttl| added.elapsed() < ttl)
    }

    pub fn add(&self, kind: BlacklistKind, model: &str) {
        if let Ok(mut set) = self.set(kind).write() {
            set.insert(model.to_string(), Instant::now());
        }
    }

    pub fn contains(&self, kind: BlacklistKind, model: &str) -> bool {
        self.set(kind)
            .read()
            .map(|set| set.get(model).is_some_and(|added| self.live(*added)))
            .unwrap_or(false)
    }

    /// Quota entries exclude a model from every request; JSON entries only from JSON mode.
    pub fn excludes(&self, model: &str, json_mode: bool) -> bool {
        self.contains(BlacklistKind::Quota, model)
            || (json_mode && self.contains(BlacklistKind::Json, model))
    }

    /// Drop `model` from both sets. Returns whether it was on either.
    pub fn remove(&self, model: &str) -> bool {
        [BlacklistKind::Json, BlacklistKind::Quota]
            .into_iter()
            .map(|kind| {
                self.set(kind)
                    .write()
                    .map(|mut set| set.remove(model).is_some())
                    .unwrap_or(false)
            })
            .fold(false, |acc, removed| acc | removed)
    }

    pub fn snapshot(&self) -> BlacklistSnapshot {
        let names = |kind| {
            let mut out: Vec<String> = self
                .set(kind)
                .read()
                .map(|set| {
                    set.iter()
                        .filter(|(_, added)| self.live(**added))
                        .map(|(name, _)| name.clone())
                        .collect()
                })
                .unwrap_or_default();
            out.sort();
            out
        };
        BlacklistSnapshot {
            json: names(BlacklistKind::Json),
            quota: names(BlacklistKind::Quota),
        }
    }
}

/// Time-boxed memo of the fastest enabled primary model.
#[derive(Debug)]
pub struct FastestModelCache {
    entry: Mutex<Option<(Arc<ModelDescriptor>, Instant)>>,
    ttl: Duration,
}

impl FastestModelCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entry: Mutex::new(None),
            ttl,
        }
    }

    pub fn get(&self) -> Option<Arc<ModelDescriptor>> {
        let slot = self.entry.lock().ok()?;
        match slot.as_ref() {
            Some((model, at)) if at.elapsed() < self.ttl => Some(Arc::clone(model)),
            _ => None,
        }
    }

    pub fn put(&self, model: Arc<ModelDescriptor>) {
        if let Ok(mut slot) = self.entry.lock() {
            *slot = Some((model, Instant::now()));
        }
    }

    pub fn invalidate(&self) {
        if let Ok(mut slot) = self.entry.lock() {
            slot.take();
        }
    }
}

fn eligible(model: &ModelDescriptor, blacklists: &Blacklists, json_mode: bool) -> bool {
    model.is_enabled() && !blacklists.excludes(&model.name, json_mode)
}

/// Lowest `last_response_time_secs` among eligible primaries.
///
/// Untried models report `0.0` and therefore win; ties keep registration order.
/// A cached pick is reused only while it is still eligible for this request. JSON-mode
/// scans are not written back to the cache because their candidate set is narrower.
pub fn select_fastest(
    registry: &ModelRegistry,
    cache: &FastestModelCache,
    blacklists: &Blacklists,
    json_mode: bool,
) -> Option<Arc<ModelDescriptor>> {
    if let Some(cached) = cache.get() {
        if eligible(&cached, blacklists, json_mode) {
            debug!(model = cached.name.as_str(), "fastest model (cached)");
            return Some(cached);
        }
    }

    let mut best: Option<(Arc<ModelDescriptor>, f64)> = None;
    for model in registry.get_primary_models() {
        if !eligible(&model, blacklists, json_mode) {
            continue;
        }
        let latency = model.last_response_time_secs();
        if best.as_ref().map_or(true, |(_, b)| latency < *b) {
            best = Some((model, latency));
        }
    }

    let (model, latency) = best?;
    debug!(model = model.name.as_str(), latency_secs = latency, "fastest model (scanned)");
    if !json_mode {
        cache.put(Arc::clone(&model));
    }
    Some(model)
}

/// First eligible primary model in registration order.
pub fn select_first_primary(
    registry: &ModelRegistry,
    blacklists: &Blacklists,
    json_mode: bool,
) -> Option<Arc<ModelDescriptor>> {
    registry
        .get_primary_models()
        .into_iter()
        .find(|m| eligible(m, blacklists, json_mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;

    fn registry() -> ModelRegistry {
        let doc = r#"
llm:
  default_provider: openai
  model_roles: { primary: [m1, m2, m3], reserve: [r1] }
providers:
  openai:
    base_url: https://api.openai.test/v1
    models:
      chat: [ { name: m1 }, { name: m2 }, { name: m3, enabled: false }, { name: r1 } ]
"#;
        let config = ConfigLoader::new().with_env(|_| None).load_str(doc).unwrap();
        ModelRegistry::from_config(&config).unwrap()
    }

    #[test]
    fn test_untried_model_is_preferred() {
        let reg = registry();
        reg.get_model_by_name("m2").unwrap().record_success(2.0);
        let cache = FastestModelCache::new(Duration::from_secs(60));
        let bl = Blacklists::default();

        let pick = select_fastest(&reg, &cache, &bl, false).unwrap();
        assert_eq!(pick.name, "m1");
        assert!(Arc::ptr_eq(&cache.get().unwrap(), &pick));
    }

    #[test]
    fn test_never_returns_disabled_or_non_primary() {
        let reg = registry();
        let cache = FastestModelCache::new(Duration::from_secs(60));
        let bl = Blacklists::default();
        reg.get_model_by_name("m1").unwrap().record_success(5.0);
        reg.get_model_by_name("m2").unwrap().record_success(3.0);

        let pick = select_fastest(&reg, &cache, &bl, false).unwrap();
        assert_eq!(pick.name, "m2");

        reg.get_model_by_name("m2").unwrap().set_enabled(false);
        let pick = select_fastest(&reg, &cache, &bl, false).unwrap();
        assert_eq!(pick.name, "m1");

        reg.get_model_by_name("m1").unwrap().set_enabled(false);
        assert!(select_fastest(&reg, &cache, &bl, false).is_none());
    }

    #[test]
    fn test_cache_expires_and_invalidates() {
        let reg = registry();
        let cache = FastestModelCache::new(Duration::ZERO);
        let bl = Blacklists::default();
        select_fastest(&reg, &cache, &bl, false).unwrap();
        assert!(cache.get().is_none());

        let cache = FastestModelCache::new(Duration::from_secs(60));
        select_fastest(&reg, &cache, &bl, false).unwrap();
        cache.invalidate();
        assert!(cache.get().is_none());
    }

    #[test]
    fn test_json_blacklist_only_affects_json_mode() {
        let reg = registry();
        let cache = FastestModelCache::new(Duration::from_secs(60));
        let bl = Blacklists::default();
        bl.add(BlacklistKind::Json, "m1");

        assert_eq!(select_fastest(&reg, &cache, &bl, true).unwrap().name, "m2");
        assert_eq!(select_fastest(&reg, &cache, &bl, false).unwrap().name, "m1");

        bl.add(BlacklistKind::Quota, "m1");
        assert_eq!(select_first_primary(&reg, &bl, false).unwrap().name, "m2");
    }

    #[test]
    fn test_blacklist_remove_and_snapshot() {
        let bl = Blacklists::new(None);
        bl.add(BlacklistKind::Quota, "b");
        bl.add(BlacklistKind::Quota, "a");
        bl.add(BlacklistKind::Json, "a");
        let snap = bl.snapshot();
        assert_eq!(snap.quota, vec!["a", "b"]);
        assert_eq!(snap.json, vec!["a"]);

        assert!(bl.remove("a"));
        assert!(!bl.remove("a"));
        assert!(!bl.excludes("a", true));
        assert!(bl.excludes("b", false));
    }

    #[test]
    fn test_blacklist_ttl_expiry() {
        let bl = Blacklists::new(Some(Duration::ZERO));
        bl.add(BlacklistKind::Json, "m");
        assert!(!bl.contains(BlacklistKind::Json, "m"));
        assert!(bl.snapshot().json.is_empty());
    }
}
