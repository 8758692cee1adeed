//! Retry logic with exponential backoff
//!
//! Every external call in the crew (model completions, quote lookups,
//! fundamentals, web search) goes through a [`RetryPolicy`]. The number of
//! attempts is bounded and the delay between attempts grows geometrically up
//! to a cap, so a misbehaving service costs at most
//! `sum(backoff_duration(1..max_attempts))` of waiting.

use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Classifies errors as transient (worth another attempt) or permanent
pub trait Retryable {
    /// Whether repeating the operation could succeed
    fn is_retryable(&self) -> bool;
}

/// Error returned once a retried operation gives up
#[derive(Debug, Error)]
#[error("{source} (after {attempts} attempt(s))")]
pub struct RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Attempts made, including the first one
    pub attempts: u32,
    /// The last error observed
    #[source]
    pub source: E,
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Discard the attempt count
    pub fn into_inner(self) -> E {
        self.source
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (the first call counts)
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_backoff: Duration,

    /// Upper bound for any single delay
    pub max_backoff: Duration,

    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Create a policy with fast retries (for testing)
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        }
    }

    /// Set the attempt bound
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the first delay
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Check that the policy is usable
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".to_string());
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            ));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(format!(
                "initial_backoff ({:?}) exceeds max_backoff ({:?})",
                self.initial_backoff, self.max_backoff
            ));
        }
        Ok(())
    }

    /// Delay to wait before attempt number `attempt` (0-based)
    ///
    /// Attempt 0 never waits. Later attempts wait
    /// `initial_backoff * multiplier^(attempt - 1)`, capped at `max_backoff`.
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let cap_ms = self.max_backoff.as_millis() as f64;

        if !backoff_ms.is_finite() || backoff_ms >= cap_ms {
            self.max_backoff
        } else {
            Duration::from_millis(backoff_ms as u64)
        }
    }

    /// Worst-case total time spent sleeping between attempts
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts).map(|a| self.backoff_duration(a)).sum()
    }

    /// Execute an async operation with retry logic
    ///
    /// # Arguments
    ///
    /// * `operation_name` - Name of the operation (for logging)
    /// * `operation` - Async operation to execute, called once per attempt
    ///
    /// # Returns
    ///
    /// The first success, or the last error together with the attempt count
    pub async fn execute<F, Fut, T, E>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::error::Error + Retryable + 'static,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            debug!(
                operation = operation_name,
                attempt = attempt + 1,
                max_attempts,
                "Attempting operation"
            );

            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(
                            operation = operation_name,
                            retries = attempt,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    attempt += 1;

                    if !e.is_retryable() {
                        debug!(
                            operation = operation_name,
                            error = %e,
                            "Operation failed with non-retryable error"
                        );
                        return Err(RetryError {
                            attempts: attempt,
                            source: e,
                        });
                    }

                    if attempt >= max_attempts {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %e,
                            "Operation failed, retries exhausted"
                        );
                        return Err(RetryError {
                            attempts: attempt,
                            source: e,
                        });
                    }

                    let backoff = self.backoff_duration(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Operation failed, retrying"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }
}
