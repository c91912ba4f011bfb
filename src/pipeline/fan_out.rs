//! Fan-out: run several candidate models concurrently under one deadline.

use futures::stream::{FuturesUnordered, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

use crate::registry::ModelDescriptor;
use crate::types::CallResult;

/// Highest score an evaluator may assign.
pub const MAX_SCORE: f64 = 10.0;

static FIRST_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number pattern is valid"));

/// When the fan-out stops consuming completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collect {
    /// Return as soon as one candidate succeeds.
    FirstSuccess,
    /// Wait for every candidate (or the deadline) so successes can be scored.
    AllSuccesses,
}

/// What came back before the deadline.
#[derive(Debug, Default)]
pub struct FanOutOutcome {
    /// Successful results in completion order.
    pub successes: Vec<CallResult>,
    pub failures: Vec<CallResult>,
    /// The deadline elapsed with candidates still outstanding.
    pub timed_out: bool,
}

impl FanOutOutcome {
    pub fn last_error(&self) -> Option<&str> {
        self.failures.last().map(CallResult::error_message)
    }
}

/// Drive one future per candidate until the collection rule is satisfied or the
/// deadline passes. Outstanding futures are dropped on return.
pub async fn fan_out<F, Fut>(
    candidates: &[Arc<ModelDescriptor>],
    deadline: Instant,
    collect: Collect,
    call: F,
) -> FanOutOutcome
where
    F: Fn(Arc<ModelDescriptor>) -> Fut,
    Fut: Future<Output = CallResult>,
{
    let mut pending: FuturesUnordered<Fut> = candidates
        .iter()
        .map(|model| call(Arc::clone(model)))
        .collect();
    let mut outcome = FanOutOutcome::default();

    loop {
        match tokio::time::timeout_at(deadline, pending.next()).await {
            Ok(Some(result)) if result.success => {
                outcome.successes.push(result);
                if collect == Collect::FirstSuccess {
                    break;
                }
            }
            Ok(Some(result)) => outcome.failures.push(result),
            Ok(None) => break,
            Err(_) => {
                outcome.timed_out = true;
                break;
            }
        }
    }
    outcome
}

/// Prompt sent to the evaluator model for one candidate response.
pub fn scoring_prompt(prompt: &str, response: &str) -> String {
    format!(
        "Rate the quality of the following response to the request on a scale from 0 to {max}.\n\
         Reply with a single number only.\n\n\
         Request:\n{prompt}\n\n\
         Response:\n{response}\n\n\
         Score (0-{max}):",
        max = MAX_SCORE as u32,
        prompt = prompt,
        response = response,
    )
}

/// First number in the evaluator's reply, clamped to `0..=10`. Unparseable replies score 0.
pub fn parse_score(text: &str) -> f64 {
    FIRST_NUMBER
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, MAX_SCORE))
        .unwrap_or(0.0)
}

/// Highest score wins; ties go to the earlier completion.
pub fn pick_best(scored: Vec<CallResult>) -> Option<CallResult> {
    scored.into_iter().fold(None, |best, candidate| match best {
        Some(b) if b.score.unwrap_or(0.0) >= candidate.score.unwrap_or(0.0) => Some(b),
        _ => Some(candidate),
    })
}
