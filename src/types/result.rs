use serde::Serialize;

use crate::Error;

/// Category of a failed [`CallResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Bad prompt, model name or response format. Never retried.
    Validation,
    /// Network failure or timeout talking to the provider.
    Transport,
    /// The provider answered with an error or an unusable body.
    Provider,
    /// The provider reported the account is out of credit.
    QuotaExhausted,
    /// JSON mode was requested and the model did not return valid JSON.
    StructuredOutput,
    /// The parallel evaluation budget elapsed before any candidate finished.
    Timeout,
    /// Every eligible model was tried and failed.
    Exhausted,
    /// The engine was closed.
    Closed,
}

impl FailureKind {
    pub(crate) fn from_error(err: &Error) -> Self {
        match err {
            Error::Validation { .. } | Error::Config(_) => FailureKind::Validation,
            Error::Transport(_) | Error::Io(_) | Error::Timeout { .. } => FailureKind::Transport,
            Error::Remote { .. } if err.is_quota_exhausted() => FailureKind::QuotaExhausted,
            Error::Remote { .. } | Error::Serialization(_) => FailureKind::Provider,
            Error::StructuredOutput { .. } => FailureKind::StructuredOutput,
            Error::Runtime { .. } => FailureKind::Provider,
        }
    }
}

/// Outcome of one invocation.
///
/// A failed result has empty `content` and a non-empty `error`; a successful one
/// has no `error`. Constructed through [`CallResult::success`] and
/// [`CallResult::failure`] so the two shapes cannot be mixed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallResult {
    pub model_name: String,
    pub content: String,
    pub response_time_secs: f64,
    pub success: bool,
    pub error: Option<String>,
    /// Set only by the parallel evaluator when an evaluator model scored this response.
    pub score: Option<f64>,
    pub failure: Option<FailureKind>,
}

impl CallResult {
    pub fn success(
        model_name: impl Into<String>,
        content: impl Into<String>,
        response_time_secs: f64,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            content: content.into(),
            response_time_secs,
            success: true,
            error: None,
            score: None,
            failure: None,
        }
    }

    pub fn failure(
        model_name: impl Into<String>,
        kind: FailureKind,
        error: impl Into<String>,
        response_time_secs: f64,
    ) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "unknown error".to_string();
        }
        Self {
            model_name: model_name.into(),
            content: String::new(),
            response_time_secs,
            success: false,
            error: Some(error),
            score: None,
            failure: Some(kind),
        }
    }

    pub(crate) fn from_error(model_name: impl Into<String>, err: &Error, response_time_secs: f64) -> Self {
        Self::failure(
            model_name,
            FailureKind::from_error(err),
            err.to_string(),
            response_time_secs,
        )
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_invariants() {
        let r = CallResult::failure("m", FailureKind::Transport, "", 0.5);
        assert!(!r.success);
        assert!(r.content.is_empty());
        assert_eq!(r.error_message(), "unknown error");
    }

    #[test]
    fn test_success_has_no_error() {
        let r = CallResult::success("m", "hi", 0.1).with_score(7.0);
        assert!(r.success);
        assert!(r.error.is_none());
        assert_eq!(r.score, Some(7.0));
    }

    #[test]
    fn test_kind_from_error() {
        assert_eq!(
            FailureKind::from_error(&Error::validation("x")),
            FailureKind::Validation
        );
        let quota = Error::Remote {
            status: 402,
            class: "quota_exhausted".into(),
            message: String::new(),
            retryable: false,
        };
        assert_eq!(FailureKind::from_error(&quota), FailureKind::QuotaExhausted);
    }
}
