//! # ai-orchestrator
//!
//! Role-based model orchestration over multiple LLM providers.
//!
//! ## Overview
//!
//! The engine sits between an application and several interchangeable model
//! backends. Each request is screened, routed to a model chosen by role, speed and
//! health, and recovered from individual backend failure before a single final
//! [`CallResult`] is returned.
//!
//! ## Key Features
//!
//! - **Role-based registry**: primary, duplicate, reserve and fallback models
//! - **Fastest-model selection**: time-boxed cache of the lowest-latency primary
//! - **Fallback chain**: Reserve → Duplicate → Fallback, each model tried once
//! - **Best-of-two**: concurrent candidates with optional evaluator scoring
//! - **JSON mode**: extraction, schema checks and a per-model JSON blacklist
//! - **Retry**: exponential backoff with jitter, validation errors never retried
//! - **Quota blacklist**: out-of-credit models are skipped for the engine's lifetime
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_orchestrator::{GenerateOptions, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> ai_orchestrator::Result<()> {
//!     let engine = Orchestrator::builder()
//!         .config_path("config/llm.yaml")
//!         .build()
//!         .await?;
//!
//!     let result = engine
//!         .generate_response("Summarize the release notes.", GenerateOptions::new())
//!         .await;
//!     if result.success {
//!         println!("{} answered: {}", result.model_name, result.content);
//!     }
//!
//!     engine.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Configuration loading, secret substitution and validation |
//! | [`registry`] | Model descriptors, roles and runtime statistics |
//! | [`drivers`] | Provider clients for the OpenAI-compatible and Google shapes |
//! | [`transport`] | HTTP transport and the injectable transport trait |
//! | [`pipeline`] | Selection, retry, fallback and fan-out operators |
//! | [`structured`] | JSON mode extraction and validation |
//! | [`client`] | The [`Orchestrator`] facade, execution and request screening |
//! | [`types`] | Request options and call outcomes |

pub mod client;
pub mod config;
pub mod drivers;
pub mod pipeline;
pub mod registry;
pub mod structured;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{Orchestrator, OrchestratorBuilder};
pub use config::{ConfigError, ConfigLoader, OrchestratorConfig};
pub use pipeline::BlacklistSnapshot;
pub use registry::{ModelDescriptor, ModelPerformance, ModelRegistry, ModelRole};
pub use transport::ModelTransport;
pub use types::{CallResult, FailureKind, GenerateOptions};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
