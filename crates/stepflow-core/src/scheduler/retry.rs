//! Failure classification and backoff for task retries.
//!
//! Classification is keyword-based on the error message: transient
//! transport and throttling failures retry, permission and validation
//! failures never do. Unrecognized errors are treated as non-retriable so
//! an unknown bug doesn't burn the retry budget.

use std::time::Duration;

// ---------------------------------------------------------------------------
// RetryClass
// ---------------------------------------------------------------------------

/// Whether a failed task execution is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Transient failure, retry with backoff.
    Retriable,
    /// Deterministic failure, retrying would reproduce it.
    NonRetriable,
}

/// Keywords marking a failure as deterministic.
const NON_RETRIABLE_KEYWORDS: &[&str] = &[
    "unauthorized",
    "forbidden",
    "permission",
    "invalid",
    "malformed",
    "not found",
    "400",
    "401",
    "403",
    "404",
];

/// Keywords marking a failure as transient.
const RETRIABLE_KEYWORDS: &[&str] = &[
    "timeout",
    "timed out",
    "rate limit",
    "too many requests",
    "429",
    "500",
    "502",
    "503",
    "504",
    "connection",
    "network",
    "unavailable",
    "temporarily",
];

/// Classify an error message.
pub fn classify(error_msg: &str) -> RetryClass {
    let lower = error_msg.to_lowercase();

    if NON_RETRIABLE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return RetryClass::NonRetriable;
    }
    if RETRIABLE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return RetryClass::Retriable;
    }

    RetryClass::NonRetriable
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Exponential backoff delay before re-running attempt `attempt + 1`.
///
/// `attempt` is the 1-based number of the attempt that just failed:
/// attempt 1 waits `base`, attempt 2 waits `2 * base`, and so on, capped
/// at `cap`.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(cap)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
