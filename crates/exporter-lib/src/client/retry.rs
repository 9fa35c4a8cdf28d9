//! Bounded exponential-backoff retry
//!
//! The policy is independent of any transport: it wraps an async operation
//! and a predicate deciding which errors are worth another attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Result of an operation that failed for good
#[derive(Debug)]
pub struct RetryFailure<E> {
    /// Last error returned by the operation
    pub error: E,
    /// Attempts made, including the first one
    pub attempts: u32,
    /// Whether the last error was retryable (attempts ran out)
    pub exhausted: bool,
}

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles for each following one
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay between attempt `attempt` and `attempt + 1` (attempts start at 0)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `op` until it succeeds, returns a non-retryable error, or the
    /// attempt budget is spent. `op` receives the zero-based attempt number.
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, retryable: P) -> Result<T, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 0;

        loop {
            let error = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !retryable(&error) {
                return Err(RetryFailure {
                    error,
                    attempts: attempt + 1,
                    exhausted: false,
                });
            }

            if attempt + 1 >= self.max_attempts {
                return Err(RetryFailure {
                    error,
                    attempts: attempt + 1,
                    exhausted: true,
                });
            }

            let delay = self.backoff(attempt);
            warn!(
                attempt = attempt + 1,
                max_attempts = self.max_attempts,
                backoff_secs = delay.as_secs_f64(),
                error = %error,
                "Rate limit hit, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
