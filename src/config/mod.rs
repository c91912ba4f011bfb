//! Configuration bootstrap.
//!
//! A configuration document declares providers, their models, and the role each
//! model plays. Secrets are referenced as `${ENV_VAR}` and resolved from the process
//! environment at load time:
//!
//! ```yaml
//! llm:
//!   default_provider: openai
//!   model_roles: { primary: [gpt-4o-mini], reserve: [gemini-1.5-flash] }
//!   strategy: single
//! providers:
//!   openai:
//!     base_url: https://api.openai.com/v1
//!     api_key: ${OPENAI_API_KEY}
//!     models: { chat: [ { name: gpt-4o-mini, max_tokens: 2048 } ] }
//!   gemini:
//!     base_url: https://generativelanguage.googleapis.com/v1beta
//!     api_key: ${GEMINI_API_KEY}
//!     models: { flash: [ { name: gemini-1.5-flash } ] }
//! ```

mod env;
pub mod error;
pub mod loader;
pub mod types;
mod validator;

pub use error::ConfigError;
pub(crate) use validator::validate_config;
pub use loader::{ConfigLoader, ALLOWED_EXTENSIONS, MAX_CONFIG_BYTES};
pub use types::{
    BlacklistSettings, LlmSection, ModelEntry, ModelRoles, OrchestratorConfig, ParallelConfig,
    ProviderConfig, RetrySettings, SecuritySettings, Strategy,
};
