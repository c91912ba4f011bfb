//! Request screening applied before any network call.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::registry::ModelRegistry;
use crate::structured::ResponseFormat;
use crate::{Error, ErrorContext, Result};

/// Longest accepted model name, in characters.
pub const MAX_MODEL_NAME_LEN: usize = 128;

static DANGEROUS_MARKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*script\b|javascript\s*:|<\s*iframe\b")
        .expect("dangerous markup pattern is valid")
});

fn rejected(msg: impl Into<String>, field: &str) -> Error {
    Error::validation_with_context(
        msg,
        ErrorContext::new()
            .with_field_path(field)
            .with_source("security_validator"),
    )
}

/// Prompt must be non-blank, at most `max_bytes` long and free of script/iframe markup.
pub fn validate_prompt(prompt: &str, max_bytes: usize) -> Result<()> {
    if prompt.trim().is_empty() {
        return Err(rejected("prompt is empty", "prompt"));
    }
    if prompt.len() > max_bytes {
        return Err(rejected(
            format!(
                "prompt is {} bytes, exceeding the limit of {} bytes",
                prompt.len(),
                max_bytes
            ),
            "prompt",
        ));
    }
    if let Some(m) = DANGEROUS_MARKUP.find(prompt) {
        return Err(rejected(
            format!("prompt contains disallowed markup '{}'", m.as_str()),
            "prompt",
        ));
    }
    Ok(())
}

/// Explicit model names must be well-formed, registered and enabled.
pub fn validate_model_name(name: &str, registry: &ModelRegistry) -> Result<()> {
    let len = name.chars().count();
    if len == 0 || len > MAX_MODEL_NAME_LEN {
        return Err(rejected(
            format!("model name must be 1..={} characters", MAX_MODEL_NAME_LEN),
            "options.model_name",
        ));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '/' | '@' | '-')))
    {
        return Err(rejected(
            format!("model name contains invalid character {:?}", bad),
            "options.model_name",
        ));
    }

    let model = registry
        .get_model_by_name(name)
        .ok_or_else(|| rejected(format!("unknown model '{}'", name), "options.model_name"))?;
    if !model.is_enabled() {
        return Err(rejected(
            format!("model '{}' is disabled", name),
            "options.model_name",
        ));
    }
    Ok(())
}

/// Parse and check an OpenAI-style `response_format` mapping.
pub fn validate_response_format(format: &Value) -> Result<ResponseFormat> {
    ResponseFormat::from_value(format)
}
