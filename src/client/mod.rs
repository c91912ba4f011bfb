//! Engine facade.
//!
//! Keep the public surface small: [`Orchestrator`] and its builder. Execution,
//! classification and request screening are split into submodules.

pub mod builder;
pub mod core;
pub(crate) mod error_classification;
mod execution;
pub mod validation;

pub use builder::OrchestratorBuilder;
pub use core::Orchestrator;
