//! Retry policy for a single model invocation.
//!
//! Retries happen at the request execution level: the executor asks the policy what
//! to do after each failed attempt and either sleeps or gives up.

use rand::Rng;
use std::time::Duration;

use crate::config::RetrySettings;
use crate::Error;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Retry { delay: Duration },
    Fail,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the computed delay applied as +/- random jitter.
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter: settings.jitter.clamp(0.0, 1.0),
        }
    }

    /// One attempt, no backoff. Used by health probes.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// `base * 2^attempt`, capped at `max_delay`, then jittered.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let cap = self.max_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = base.saturating_mul(factor).min(cap);

        if self.jitter <= 0.0 || delay == 0 {
            return Duration::from_millis(delay);
        }
        let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        let jittered = (delay as f64 * (1.0 + spread)).round().max(0.0) as u64;
        Duration::from_millis(jittered.min(cap))
    }

    /// `attempt` is 0-based (first failure => 0).
    pub(crate) fn decide(&self, err: &Error, attempt: u32) -> Decision {
        if err.is_validation() || !err.is_retryable() {
            return Decision::Fail;
        }
        if attempt.saturating_add(1) >= self.max_attempts {
            return Decision::Fail;
        }
        Decision::Retry {
            delay: self.backoff(attempt),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}
