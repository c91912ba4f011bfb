//! Error classification logic

/// Classification of a non-success provider response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HttpFailure {
    pub class: &'static str,
    pub retryable: bool,
}

/// Body fragments providers use to report an exhausted balance rather than a
/// short-lived rate limit. OpenAI returns these with HTTP 429, others with 400 or 403.
const QUOTA_MARKERS: &[&str] = &[
    "insufficient_quota",
    "exceeded your current quota",
    "credit balance",
    "out of credits",
    "insufficient credits",
];

/// Statuses whose body is inspected for [`QUOTA_MARKERS`].
const QUOTA_BODY_STATUSES: &[u16] = &[400, 403, 429];

/// Map an HTTP status plus error body to an error class.
///
/// Rate limits, timeouts and server errors are transient and retryable; quota
/// exhaustion and client errors fail the same way on every attempt.
pub(crate) fn classify_http_failure(status: u16, body: &str) -> HttpFailure {
    let lower = body.to_lowercase();
    let quota_body = QUOTA_BODY_STATUSES.contains(&status)
        && QUOTA_MARKERS.iter().any(|m| lower.contains(m));
    if status == 402 || quota_body {
        return HttpFailure {
            class: "quota_exhausted",
            retryable: false,
        };
    }

    let (class, retryable) = match status {
        408 | 504 => ("timeout", true),
        429 => ("rate_limited", true),
        500..=599 => ("server_error", true),
        401 | 403 => ("authentication", false),
        404 => ("not_found", false),
        400 | 413 | 422 => ("invalid_request", false),
        _ => ("http_error", false),
    };
    HttpFailure { class, retryable }
}
