//! Quota/retry classification of provider error text.

/// Lowercase substrings that mark an error as a quota or capacity problem.
pub const QUOTA_INDICATORS: &[&str] = &[
    "quota",
    "exhausted",
    "capacity",
    "rate limit",
    "429",
    "too many requests",
    "terminalquotaerror",
    "empty response",
];

/// How an error message should be handled by retry and fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub is_quota: bool,
    pub is_retryable: bool,
}

/// Classify an error message.
///
/// Quota errors are never retryable. Anything else, including an empty
/// message, is treated as transient.
pub fn classify(message: &str) -> Classification {
    let lower = message.to_lowercase();
    let is_quota = QUOTA_INDICATORS.iter().any(|needle| lower.contains(needle));
    Classification {
        is_quota,
        is_retryable: !is_quota,
    }
}
