//! Fixed-delay retry policy for transient failures
//!
//! An operation is attempted up to `max_attempts` times. Only errors that
//! report themselves as retryable trigger another attempt, with a fixed delay
//! in between.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::AuditConfig;
use crate::error::RetryableError;

/// Retry policy with a fixed delay between attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(100),
        }
    }
}

impl From<&AuditConfig> for RetryPolicy {
    fn from(config: &AuditConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: config.retry_delay(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Execute an async operation with retry logic
    ///
    /// # Returns
    ///
    /// The result of the operation, or the last error if all attempts are exhausted
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + std::fmt::Display,
    {
        let mut attempt = 1u32;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    if attempt >= self.max_attempts {
                        warn!(
                            attempts = attempt,
                            error = %err,
                            "Max attempts exhausted"
                        );
                        return Err(err);
                    }

                    debug!(
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %err,
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
