use std::path::PathBuf;
use std::sync::Arc;

use crate::client::core::Orchestrator;
use crate::config::{validate_config, ConfigLoader, OrchestratorConfig};
use crate::drivers::ProviderPool;
use crate::registry::ModelRegistry;
use crate::transport::ModelTransport;
use crate::{Error, Result};

enum ConfigSource {
    Path(PathBuf),
    Text(String),
    Parsed(OrchestratorConfig),
}

/// Builder for creating an [`Orchestrator`].
///
/// Keep this surface area small and predictable: pick a configuration source,
/// optionally swap the environment lookup or the transport, then `build()`.
pub struct OrchestratorBuilder {
    source: Option<ConfigSource>,
    loader: ConfigLoader,
    transport: Option<Arc<dyn ModelTransport>>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            loader: ConfigLoader::new(),
            transport: None,
        }
    }

    /// Load the configuration from a `.yaml`, `.yml` or `.json` file.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(ConfigSource::Path(path.into()));
        self
    }

    /// Use an in-memory configuration document. Placeholders are still substituted.
    pub fn config_str(mut self, text: impl Into<String>) -> Self {
        self.source = Some(ConfigSource::Text(text.into()));
        self
    }

    /// Use an already constructed configuration. It is validated at build time.
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.source = Some(ConfigSource::Parsed(config));
        self
    }

    /// Replace the environment lookup for `${NAME}` placeholders.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.loader = self.loader.with_env(lookup);
        self
    }

    /// Route every provider through `transport` instead of HTTP.
    pub fn with_transport(mut self, transport: Arc<dyn ModelTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub async fn build(self) -> Result<Orchestrator> {
        let config = match self.source {
            Some(ConfigSource::Path(path)) => self.loader.load(&path).await?,
            Some(ConfigSource::Text(text)) => self.loader.load_str(&text)?,
            Some(ConfigSource::Parsed(config)) => {
                validate_config(&config)?;
                config
            }
            None => {
                return Err(Error::validation(
                    "no configuration source; call config_path, config_str or config",
                ))
            }
        };

        let registry = ModelRegistry::from_config(&config)?;
        let pool = ProviderPool::from_config(&config, self.transport)?;
        Ok(Orchestrator::new(config, registry, pool))
    }
}
