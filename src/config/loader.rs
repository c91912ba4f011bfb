//! Configuration loader: path screening, parsing, secret substitution, validation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_yaml::Value;
use tracing::{debug, info};

use super::env::EnvSubstitutor;
use super::validator::validate_config;
use super::{ConfigError, OrchestratorConfig};

/// Extensions accepted for configuration documents.
pub const ALLOWED_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Upper bound on the configuration file size (10 MiB).
pub const MAX_CONFIG_BYTES: u64 = 10 * 1024 * 1024;

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Loads an [`OrchestratorConfig`] from disk.
///
/// The file is screened before it is opened (regular file, allow-listed extension,
/// size ceiling), then parsed, walked for `${NAME}` placeholders, and validated.
#[derive(Clone)]
pub struct ConfigLoader {
    env: EnvLookup,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Replace the environment lookup used for `${NAME}` placeholders.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    pub async fn load(&self, path: impl AsRef<Path>) -> Result<OrchestratorConfig, ConfigError> {
        let path = self.screen_path(path.as_ref()).await?;

        let bytes = tokio::fs::read(&path).await.map_err(|e| ConfigError::Load {
            path: path.to_string_lossy().to_string(),
            reason: e.to_string(),
            hint: Some("Check if the file exists and you have read permissions.".to_string()),
        })?;
        let text = String::from_utf8(bytes).map_err(|e| ConfigError::Load {
            path: path.to_string_lossy().to_string(),
            reason: format!("file is not valid UTF-8: {}", e),
            hint: None,
        })?;

        let config = self.load_str(&text)?;
        info!(
            path = %path.display(),
            providers = config.providers.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parse, substitute and validate a document that is already in memory.
    ///
    /// JSON is a subset of YAML, so one parser serves every allowed extension.
    pub fn load_str(&self, text: &str) -> Result<OrchestratorConfig, ConfigError> {
        let mut document: Value =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;

        EnvSubstitutor::new(self.env.as_ref()).substitute(&mut document)?;
        require_sections(&document)?;

        let config: OrchestratorConfig =
            serde_yaml::from_value(document).map_err(|e| ConfigError::Parse(e.to_string()))?;
        validate_config(&config)?;
        Ok(config)
    }

    async fn screen_path(&self, path: &Path) -> Result<PathBuf, ConfigError> {
        let display = path.to_string_lossy().to_string();
        let rejected = |reason: &str| ConfigError::InvalidPath {
            path: display.clone(),
            reason: reason.to_string(),
            hint: None,
        };

        let resolved = tokio::fs::canonicalize(path)
            .await
            .map_err(|_| rejected("path does not exist"))?;
        let meta = tokio::fs::metadata(&resolved)
            .await
            .map_err(|e| rejected(&e.to_string()))?;

        if !meta.is_file() {
            return Err(rejected("not a regular file"));
        }

        let ext = resolved
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(rejected("extension not allowed")
                .with_hint(format!("Use one of: {}", ALLOWED_EXTENSIONS.join(", "))));
        }

        if meta.len() > MAX_CONFIG_BYTES {
            return Err(rejected(&format!(
                "file is {} bytes, limit is {}",
                meta.len(),
                MAX_CONFIG_BYTES
            )));
        }

        debug!(path = %resolved.display(), bytes = meta.len(), "configuration path accepted");
        Ok(resolved)
    }
}

fn require_sections(document: &Value) -> Result<(), ConfigError> {
    let Value::Mapping(root) = document else {
        return Err(ConfigError::Parse(
            "configuration root must be a mapping".to_string(),
        ));
    };

    for section in ["llm", "providers"] {
        if !root.contains_key(section) {
            return Err(ConfigError::MissingSection {
                section: section.to_string(),
                hint: None,
            }
            .with_hint("Both 'llm' and 'providers' are required at the top level"));
        }
    }

    match root.get("llm") {
        Some(Value::Mapping(llm)) if llm.contains_key("default_provider") => Ok(()),
        Some(Value::Mapping(_)) => Err(ConfigError::MissingSection {
            section: "llm.default_provider".to_string(),
            hint: None,
        }),
        _ => Err(ConfigError::invalid("llm", "must be a mapping")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
llm:
  default_provider: openai
  model_roles:
    primary: [gpt-a]
providers:
  openai:
    base_url: https://api.openai.com/v1
    api_key: ${OPENAI_KEY}
    models:
      chat:
        - name: gpt-a
"#;

    #[test]
    fn test_load_str_substitutes_secret() {
        let loader = ConfigLoader::new().with_env(|name| {
            (name == "OPENAI_KEY").then(|| "sk-test".to_string())
        });
        let config = loader.load_str(MINIMAL).unwrap();
        assert_eq!(
            config.providers["openai"].api_key.as_deref(),
            Some("sk-test")
        );
    }

    #[test]
    fn test_missing_providers_section() {
        let loader = ConfigLoader::new().with_env(|_| None);
        let err = loader
            .load_str("llm:\n  default_provider: openai\n")
            .unwrap_err();
        match err {
            ConfigError::MissingSection { section, .. } => assert_eq!(section, "providers"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_default_provider() {
        let loader = ConfigLoader::new().with_env(|_| None);
        let err = loader.load_str("llm: {}\nproviders: {}\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection { ref section, .. } if section == "llm.default_provider"));
    }

    #[test]
    fn test_rejects_non_mapping_root() {
        let loader = ConfigLoader::new().with_env(|_| None);
        assert!(matches!(
            loader.load_str("- just\n- a list\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}
