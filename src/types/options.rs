use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-request options for [`crate::Orchestrator::generate_response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Target one model explicitly. Falls back through the chain if it fails.
    #[serde(default)]
    pub model_name: Option<String>,
    /// Start from the fastest primary model instead of the first one.
    #[serde(default = "default_use_fastest")]
    pub use_fastest: bool,
    /// Run the configured parallel candidates concurrently (best-of-two).
    #[serde(default)]
    pub use_parallel: bool,
    /// OpenAI-style `response_format` mapping, e.g. `{"type": "json_object"}`.
    #[serde(default)]
    pub response_format: Option<Value>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            model_name: None,
            use_fastest: default_use_fastest(),
            use_parallel: false,
            response_format: None,
        }
    }
}

impl GenerateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    pub fn fastest(mut self, enable: bool) -> Self {
        self.use_fastest = enable;
        self
    }

    pub fn parallel(mut self, enable: bool) -> Self {
        self.use_parallel = enable;
        self
    }

    pub fn response_format(mut self, format: Value) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Shorthand for `{"type": "json_object"}`.
    pub fn json(self) -> Self {
        self.response_format(serde_json::json!({ "type": "json_object" }))
    }
}

fn default_use_fastest() -> bool {
    true
}
