//! JSON mode support for structured output.
//!
//! Provides the response-format contract sent to providers and the extraction and
//! validation applied to what comes back.

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use std::sync::Arc;

use crate::{Error, ErrorContext, Result};

/// A JSON Schema compiled once, when the response format is parsed.
#[derive(Clone)]
pub struct CompiledSchema {
    source: Value,
    validator: Arc<JSONSchema>,
}

impl CompiledSchema {
    pub fn compile(source: Value) -> std::result::Result<Self, String> {
        let validator = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&source)
            .map_err(|e| e.to_string())?;
        Ok(Self {
            source,
            validator: Arc::new(validator),
        })
    }

    pub fn as_value(&self) -> &Value {
        &self.source
    }

    /// Every validation error for `instance`, rendered as text.
    pub fn errors(&self, instance: &Value) -> Vec<String> {
        match self.validator.validate(instance) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.map(|e| e.to_string()).collect(),
        }
    }
}

impl PartialEq for CompiledSchema {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CompiledSchema").field(&self.source).finish()
    }
}

/// Requested response format.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    /// Free-form text; no validation.
    Text,

    /// Any JSON object.
    JsonObject,

    /// JSON checked against a caller-supplied schema.
    JsonSchema {
        name: String,
        schema: CompiledSchema,
        strict: bool,
    },
}

impl ResponseFormat {
    /// Recognized `type` values of a response-format mapping.
    pub const KNOWN_TYPES: &'static [&'static str] = &["text", "json_object", "json_schema"];

    /// Parse an OpenAI-style `response_format` mapping.
    ///
    /// ```
    /// use ai_orchestrator::structured::ResponseFormat;
    /// use serde_json::json;
    ///
    /// let format = ResponseFormat::from_value(&json!({"type": "json_object"})).unwrap();
    /// assert!(format.is_json());
    /// assert!(ResponseFormat::from_value(&json!("json_object")).is_err());
    /// ```
    pub fn from_value(value: &Value) -> Result<Self> {
        let invalid = |msg: String| {
            Error::validation_with_context(
                msg,
                ErrorContext::new()
                    .with_field_path("options.response_format")
                    .with_source("security_validator"),
            )
        };

        let map = value
            .as_object()
            .ok_or_else(|| invalid("response_format must be a mapping".to_string()))?;
        let kind = map
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("response_format.type must be a string".to_string()))?;

        match kind {
            "text" => Ok(ResponseFormat::Text),
            "json_object" => Ok(ResponseFormat::JsonObject),
            "json_schema" => {
                let section = map.get("json_schema").and_then(Value::as_object).ok_or_else(|| {
                    invalid("json_schema format requires a 'json_schema' mapping".to_string())
                })?;
                let schema = section
                    .get("schema")
                    .filter(|s| s.is_object())
                    .cloned()
                    .ok_or_else(|| invalid("json_schema.schema must be an object".to_string()))?;
                let schema = CompiledSchema::compile(schema)
                    .map_err(|e| invalid(format!("json_schema.schema does not compile: {}", e)))?;

                Ok(ResponseFormat::JsonSchema {
                    name: section
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("response")
                        .to_string(),
                    schema,
                    strict: section.get("strict").and_then(Value::as_bool).unwrap_or(true),
                })
            }
            other => Err(invalid(format!(
                "unsupported response_format.type '{}'; expected one of {:?}",
                other,
                Self::KNOWN_TYPES
            ))),
        }
    }

    pub fn is_json(&self) -> bool {
        !matches!(self, ResponseFormat::Text)
    }

    pub fn schema(&self) -> Option<&Value> {
        self.compiled_schema().map(CompiledSchema::as_value)
    }

    pub fn compiled_schema(&self) -> Option<&CompiledSchema> {
        match self {
            ResponseFormat::JsonSchema { schema, .. } => Some(schema),
            _ => None,
        }
    }

    /// Value for the OpenAI `response_format` request field.
    pub fn to_openai_format(&self) -> Option<Value> {
        match self {
            ResponseFormat::Text => None,
            ResponseFormat::JsonObject => Some(serde_json::json!({ "type": "json_object" })),
            ResponseFormat::JsonSchema {
                name,
                schema,
                strict,
            } => Some(serde_json::json!({
                "type": "json_schema",
                "json_schema": { "name": name, "strict": strict, "schema": schema.as_value() }
            })),
        }
    }
}

/// Why a response was rejected under JSON mode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JsonViolation {
    #[error("response contains no parseable JSON")]
    NotJson,

    #[error("expected a JSON object, got {0}")]
    NotObject(&'static str),

    #[error("response does not match schema: {0}")]
    SchemaMismatch(String),
}

/// Remove one surrounding markdown code fence (```json ... ``` or ``` ... ```).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Extract the first syntactically valid JSON object or array from model text.
///
/// Tolerates a surrounding code fence and leading or trailing prose.
pub fn extract_json(text: &str) -> Option<Value> {
    let candidate = strip_code_fence(text);
    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        if value.is_object() || value.is_array() {
            return Some(value);
        }
    }

    for (idx, ch) in candidate.char_indices() {
        if ch != '{' && ch != '[' {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&candidate[idx..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            return Some(value);
        }
    }
    None
}

/// Validate a model response under JSON mode and return the extracted value.
///
/// Bare arrays are accepted only when the schema's top-level `type` is `array`.
pub fn validate_json_output(
    text: &str,
    format: &ResponseFormat,
) -> std::result::Result<Value, JsonViolation> {
    let value = extract_json(text).ok_or(JsonViolation::NotJson)?;

    let schema = format.schema();
    let array_allowed = schema
        .and_then(|s| s.get("type"))
        .and_then(Value::as_str)
        .map(|t| t == "array")
        .unwrap_or(false);

    match &value {
        Value::Object(_) => {}
        Value::Array(_) if array_allowed => {}
        Value::Array(_) => return Err(JsonViolation::NotObject("array")),
        _ => return Err(JsonViolation::NotObject("scalar")),
    }

    if let Some(compiled) = format.compiled_schema() {
        let messages = compiled.errors(&value);
        if !messages.is_empty() {
            return Err(JsonViolation::SchemaMismatch(messages.join("; ")));
        }
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_rejects_unknown_type() {
        let err = ResponseFormat::from_value(&json!({"type": "xml"})).unwrap_err();
        assert!(err.is_validation());
        assert!(ResponseFormat::from_value(&json!({})).is_err());
        assert_eq!(
            ResponseFormat::from_value(&json!({"type": "text"})).unwrap(),
            ResponseFormat::Text
        );
    }

    #[test]
    fn test_from_value_json_schema() {
        let format = ResponseFormat::from_value(&json!({
            "type": "json_schema",
            "json_schema": {"name": "user", "schema": {"type": "object"}}
        }))
        .unwrap();
        let openai = format.to_openai_format().unwrap();
        assert_eq!(openai["type"], "json_schema");
        assert_eq!(openai["json_schema"]["name"], "user");
        assert_eq!(openai["json_schema"]["strict"], true);

        assert!(ResponseFormat::from_value(&json!({"type": "json_schema"})).is_err());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n[1]\n```\n"), "[1]");
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_from_prose() {
        let text = "Sure! Here is the result: {\"status\": \"ok\", \"n\": 2} Hope that helps.";
        assert_eq!(extract_json(text), Some(json!({"status": "ok", "n": 2})));
    }

    #[test]
    fn test_extract_skips_invalid_braces() {
        let text = "Set {x} to the value below:\n{\"x\": 5}";
        assert_eq!(extract_json(text), Some(json!({"x": 5})));
    }

    #[test]
    fn test_extract_returns_none_for_plain_text() {
        assert_eq!(extract_json("I cannot answer that in JSON."), None);
    }

    #[test]
    fn test_validate_requires_object() {
        let format = ResponseFormat::JsonObject;
        assert!(validate_json_output("```json\n{\"a\": true}\n```", &format).is_ok());
        assert_eq!(
            validate_json_output("[1, 2]", &format),
            Err(JsonViolation::NotObject("array"))
        );
        assert_eq!(
            validate_json_output("just words", &format),
            Err(JsonViolation::NotJson)
        );
    }

    #[test]
    fn test_validate_against_schema() {
        let format = ResponseFormat::from_value(&json!({
            "type": "json_schema",
            "json_schema": {
                "name": "user",
                "schema": {
                    "type": "object",
                    "properties": {"name": {"type": "string"}},
                    "required": ["name"]
                }
            }
        }))
        .unwrap();
        assert!(validate_json_output(r#"{"name": "Ada"}"#, &format).is_ok());
        assert!(matches!(
            validate_json_output(r#"{"age": 3}"#, &format),
            Err(JsonViolation::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_array_schema_permits_array() {
        let format = ResponseFormat::JsonSchema {
            name: "list".into(),
            schema: CompiledSchema::compile(json!({"type": "array", "items": {"type": "integer"}}))
                .unwrap(),
            strict: false,
        };
        assert_eq!(
            validate_json_output("[1, 2, 3]", &format),
            Ok(json!([1, 2, 3]))
        );
    }

    #[test]
    fn test_compiled_schema_is_shared_by_clones() {
        let format = ResponseFormat::from_value(&json!({
            "type": "json_schema",
            "json_schema": {"schema": {"type": "object", "required": ["id"]}}
        }))
        .unwrap();
        let copy = format.clone();
        assert_eq!(copy, format);

        let (Some(a), Some(b)) = (format.compiled_schema(), copy.compiled_schema()) else {
            panic!("json_schema format carries a compiled schema");
        };
        assert!(Arc::ptr_eq(&a.validator, &b.validator));
        assert_eq!(a.errors(&json!({"id": 1})), Vec::<String>::new());
        assert_eq!(a.errors(&json!({})).len(), 1);
    }

    #[test]
    fn test_uncompilable_schema_is_rejected_up_front() {
        let err = ResponseFormat::from_value(&json!({
            "type": "json_schema",
            "json_schema": {"schema": {"type": 12}}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("does not compile"));
    }
}
