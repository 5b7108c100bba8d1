//! Error classification and retry support.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::common::ConfigurationError;

/// Classification of error types for handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// May resolve on retry (network issues, timeouts, 5xx responses)
    Transient,
    /// Won't resolve on retry (bad request, undecodable payload)
    Permanent,
    /// Rate limits and exhausted pools
    ResourceExhausted,
    /// Missing or invalid settings
    Configuration,
    /// Bugs and unexpected state
    Internal,
}

/// Trait for errors that can classify themselves for retry logic.
pub trait ErrorClassification {
    /// Returns the category of this error
    fn category(&self) -> ErrorCategory;

    /// Returns true if this error is transient and may succeed on retry
    fn is_transient(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transient | ErrorCategory::ResourceExhausted
        )
    }

    /// Returns true if this error is permanent and won't succeed on retry
    fn is_permanent(&self) -> bool {
        matches!(self.category(), ErrorCategory::Permanent)
    }
}

impl ErrorClassification for ConfigurationError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Fixed retry schedule: `retries` extra attempts, `delay` between each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// The last error seen by [`retry_with_fixed_delay`] and how many attempts were made.
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub error: E,
    pub attempts: u32,
}

/// Runs `operation` until it succeeds, fails with a non-transient error, or
/// the policy's attempts are used up. The delay never grows.
pub async fn retry_with_fixed_delay<T, E, F, Fut>(
    label: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, RetryFailure<E>>
where
    E: ErrorClassification + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempts = 0;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.is_transient() || attempts >= max_attempts {
                    return Err(RetryFailure { error, attempts });
                }

                warn!(
                    operation = label,
                    attempt = attempts,
                    max_attempts,
                    error = %error,
                    "Request failed, retrying in {:?}",
                    policy.delay
                );
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}
