//! Structural validation of a parsed configuration.

use std::collections::{HashMap, HashSet};

use super::{ConfigError, OrchestratorConfig, ParallelConfig};

/// Validate cross-references that serde alone cannot express.
pub(crate) fn validate_config(config: &OrchestratorConfig) -> Result<(), ConfigError> {
    let llm = &config.llm;

    if !config.providers.contains_key(&llm.default_provider) {
        return Err(ConfigError::invalid(
            "llm.default_provider",
            format!(
                "provider '{}' is not declared under 'providers'",
                llm.default_provider
            ),
        ));
    }

    for (name, provider) in &config.providers {
        url::Url::parse(&provider.base_url).map_err(|e| {
            ConfigError::invalid(format!("providers.{}.base_url", name), e.to_string())
        })?;
    }

    // Model names are the registry key, so they must be unique across providers.
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for (provider, entry) in config.model_entries() {
        if entry.name.trim().is_empty() {
            return Err(ConfigError::invalid(
                format!("providers.{}.models", provider),
                "model name must be non-empty",
            ));
        }
        if let Some(previous) = owners.insert(entry.name.as_str(), provider) {
            return Err(ConfigError::invalid(
                format!("providers.{}.models", provider),
                format!(
                    "model '{}' is already declared by provider '{}'",
                    entry.name, previous
                ),
            ));
        }
    }

    let roles = [
        ("primary", &llm.model_roles.primary),
        ("duplicate", &llm.model_roles.duplicate),
        ("reserve", &llm.model_roles.reserve),
        ("fallback", &llm.model_roles.fallback),
    ];
    let mut assigned: HashSet<&str> = HashSet::new();
    for (role, names) in roles {
        for name in names {
            if !owners.contains_key(name.as_str()) {
                return Err(ConfigError::invalid(
                    format!("llm.model_roles.{}", role),
                    format!("model '{}' is not declared by any provider", name),
                ));
            }
            if !assigned.insert(name.as_str()) {
                return Err(ConfigError::invalid(
                    format!("llm.model_roles.{}", role),
                    format!("model '{}' is assigned to more than one role", name),
                ));
            }
        }
    }

    if let Some(parallel) = &llm.parallel {
        for name in &parallel.models {
            if !owners.contains_key(name.as_str()) {
                return Err(ConfigError::invalid(
                    "llm.parallel.models",
                    format!("model '{}' is not declared by any provider", name),
                ));
            }
        }
        if let Some(evaluator) = &parallel.evaluator_model {
            if !owners.contains_key(evaluator.as_str()) {
                return Err(ConfigError::invalid(
                    "llm.parallel.evaluator_model",
                    format!("model '{}' is not declared by any provider", evaluator),
                ));
            }
        }
        if !(parallel.timeout_secs.is_finite() && parallel.timeout_secs > 0.0) {
            return Err(ConfigError::invalid(
                "llm.parallel.timeout_secs",
                "must be a positive number of seconds",
            ));
        }
        if parallel.timeout_secs > ParallelConfig::MAX_TIMEOUT_SECS {
            return Err(ConfigError::invalid(
                "llm.parallel.timeout_secs",
                format!("must not exceed {} seconds", ParallelConfig::MAX_TIMEOUT_SECS),
            ));
        }
    }

    if llm.retry.max_attempts == 0 {
        return Err(ConfigError::invalid(
            "llm.retry.max_attempts",
            "at least one attempt is required",
        ));
    }
    if !(0.0..=1.0).contains(&llm.retry.jitter) {
        return Err(ConfigError::invalid(
            "llm.retry.jitter",
            "must be between 0.0 and 1.0",
        ));
    }
    if llm.security.max_prompt_bytes == 0 {
        return Err(ConfigError::invalid(
            "llm.security.max_prompt_bytes",
            "must be greater than zero",
        ));
    }

    Ok(())
}
