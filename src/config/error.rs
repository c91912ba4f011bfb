//! Configuration error types

fn render_hint(hint: &Option<String>) -> String {
    hint.as_ref()
        .map(|h| format!("\n Hint: {}", h))
        .unwrap_or_default()
}

/// Errors raised while loading and validating the orchestrator configuration.
///
/// All of these are fatal at startup: an engine is never built from a
/// configuration that produced one.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Refusing to load configuration from {path}: {reason}{}", render_hint(.hint))]
    InvalidPath {
        path: String,
        reason: String,
        hint: Option<String>,
    },

    #[error("Failed to load configuration from {path}: {reason}{}", render_hint(.hint))]
    Load {
        path: String,
        reason: String,
        hint: Option<String>,
    },

    #[error("Configuration syntax error: {0}")]
    Parse(String),

    #[error("Environment variable '{name}' referenced at {path} is not set{}", render_hint(.hint))]
    UnresolvedVariable {
        name: String,
        path: String,
        hint: Option<String>,
    },

    #[error("Empty placeholder '${{}}' at {path}")]
    EmptyPlaceholder { path: String },

    #[error("Circular reference detected while resolving {chain}")]
    CircularReference { chain: String },

    #[error("Missing required section '{section}'{}", render_hint(.hint))]
    MissingSection {
        section: String,
        hint: Option<String>,
    },

    #[error("Invalid value at {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    /// Attach an actionable hint to the error
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        let hint_val = Some(hint.into());
        match self {
            ConfigError::InvalidPath { ref mut hint, .. } => *hint = hint_val,
            ConfigError::Load { ref mut hint, .. } => *hint = hint_val,
            ConfigError::UnresolvedVariable { ref mut hint, .. } => *hint = hint_val,
            ConfigError::MissingSection { ref mut hint, .. } => *hint = hint_val,
            _ => (),
        }
        self
    }

    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
