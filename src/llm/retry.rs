use std::time::Duration;

use super::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// Sleep this long, then send again.
    Retry(Duration),
    /// Stop trying this model.
    GiveUp,
}

/// `2^attempt + 0.5 * attempt` seconds.
pub fn exponential_backoff(attempt: u32) -> Duration {
    let a = attempt.min(16) as f64;
    Duration::from_secs_f64(2f64.powf(a) + 0.5 * a)
}

/// `2^attempt * 2` seconds.
pub fn rate_limit_backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt.min(16)) * 2)
}

/// Decides what follows a failed send. `attempt` is zero-based.
///
/// A `Retry-After` hint overrides the computed rate-limit wait.
pub fn decide(error: &TransportError, attempt: u32) -> RetryDecision {
    match error {
        TransportError::Status { status: 503, .. } => {
            RetryDecision::Retry(exponential_backoff(attempt))
        }
        TransportError::RateLimited { retry_after } => {
            RetryDecision::Retry(retry_after.unwrap_or_else(|| rate_limit_backoff(attempt)))
        }
        TransportError::Timeout { .. } | TransportError::Connection { .. } => {
            RetryDecision::Retry(exponential_backoff(attempt))
        }
        TransportError::Status { .. } | TransportError::InvalidResponse { .. } => {
            RetryDecision::GiveUp
        }
    }
}
