//! Request options and call outcomes.

pub mod options;
pub mod result;

pub use options::GenerateOptions;
pub use result::{CallResult, FailureKind};
