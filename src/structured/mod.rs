//! Structured output (JSON mode).
//!
//! - [`ResponseFormat`]: the caller's requested format, parsed from a `response_format` mapping
//! - [`extract_json`]: pull the first JSON object/array out of free-form model text
//! - [`validate_json_output`]: accept or reject a response under JSON mode
//!
//! # Examples
//!
//! ```
//! use ai_orchestrator::structured::{validate_json_output, ResponseFormat};
//!
//! let reply = "Here you go:\n```json\n{\"answer\": 42}\n```";
//! let value = validate_json_output(reply, &ResponseFormat::JsonObject).unwrap();
//! assert_eq!(value["answer"], 42);
//! ```

pub mod json_mode;

pub use json_mode::{
    extract_json, strip_code_fence, validate_json_output, CompiledSchema, JsonViolation,
    ResponseFormat,
};
