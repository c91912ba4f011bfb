//! OpenAI-compatible chat completions (OpenAI, DeepSeek, OpenRouter, Groq, ...).
//!
//! - `POST {base_url}/chat/completions` with bearer auth.
//! - Response text at `choices[0].message.content`.

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
    let mut body = json!({
        "model": model.name,
        "messages": [{ "role": "user", "content": prompt }],
        "max_tokens": model.max_tokens,
        "temperature": model.temperature,
        "top_p": model.top_p,
    });
    if let Some(rf) = format.and_then(ResponseFormat::to_openai_format) {
        body["response_format"] = rf;
    }

    let mut headers = vec![("content-type".to_string(), "application/json".to_string())];
    if let Some(key) = api_key {
        headers.push(("authorization".to_string(), format!("Bearer {}", key)));
    }

    ProviderRequest {
        url: format!("{}/chat/completions", base_url),
        headers,
        query: Vec::new(),
        body,
    }
}

pub(crate) fn parse_response(body: &Value) -> Result<String> {
    if let Some(err) = body.get("error") {
        return Err(Error::Remote {
            status: 200,
            class: "provider_error".to_string(),
            message: err.to_string(),
            retryable: true,
        });
    }

    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(String::from)
        .ok_or_else(|| Error::Remote {
            status: 200,
            class: "malformed_response".to_string(),
            message: "response has no choices[0].message.content".to_string(),
            retryable: true,
        })
}
