//! Google generate-content endpoint.
//!
//! Key differences from the OpenAI shape:
//! - Uses `contents` with `parts` instead of `messages`.
//! - `generationConfig` wraps `maxOutputTokens`, `temperature`, `topP`.
//! - JSON mode is requested with `responseMimeType: application/json`.
//! - Response: `candidates[0].content.parts[*].text`.
//! - API key is passed as `?key=` query parameter, not in headers.

use serde_json::{json, Value};

use crate::registry::ModelDescriptor;
use crate::structured::ResponseFormat;
use crate::transport::ProviderRequest;
use crate::{Error, Result};

pub(crate) fn build_request(
    base_url: &str,
    api_key: Option<&str>,
    prompt: &str,
    model: &ModelDescriptor,
    format: Option<&ResponseFormat>,
) -> ProviderRequest {
    let mut generation_config = json!({
        "maxOutputTokens": model.max_tokens,
        "temperature": model.temperature,
        "topP": model.top_p,
    });
    if let Some(rf) = format.filter(|f| f.is_json()) {
        generation_config["responseMimeType"] = json!("application/json");
        if let Some(schema) = rf.schema() {
            generation_config["responseSchema"] = schema.clone();
        }
    }

    let body = json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": generation_config,
    });

    let query = api_key
        .map(|key| vec![("key".to_string(), key.to_string())])
        .unwrap_or_default();

    ProviderRequest {
        url: format!("{}/models/{}:generateContent", base_url, model.name),
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        query,
        body,
    }
}

pub(crate) fn parse_response(body: &Value) -> Result<String> {
    if let Some(reason) = body
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        return Err(Error::Remote {
            status: 200,
            class: "content_blocked".to_string(),
            message: format!("prompt blocked by provider: {}", reason),
            retryable: false,
        });
    }

    let text: String = body
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(Error::Remote {
            status: 200,
            class: "malformed_response".to_string(),
            message: "response has no candidates[0].content.parts text".to_string(),
            retryable: true,
        });
    }
    Ok(text)
}
