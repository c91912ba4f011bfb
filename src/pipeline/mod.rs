//! Request-processing pipeline: the policy operators wrapped around model calls.
//!
//! ## Submodules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`select`] | Fastest-model cache, blacklists and primary selection |
//! | [`retry`] | Exponential backoff with jitter for one model |
//! | [`fallback`] | Reserve → Duplicate → Fallback failover |
//! | [`fan_out`] | Concurrent candidates under a deadline, evaluator scoring |
//!
//! ```text
//! prompt → select ─┬─ single model ── retry ──┐
//!                  └─ fan_out (N models) ─────┼─→ JSON guard → result
//!                          failure ──→ fallback┘
//! ```

pub mod fan_out;
pub mod select;

// Resilience operators
pub mod fallback;
pub mod retry;

pub use fallback::FallbackChain;
pub use fan_out::{Collect, FanOutOutcome};
pub use retry::RetryPolicy;
pub use select::{BlacklistKind, BlacklistSnapshot, Blacklists, FastestModelCache};
