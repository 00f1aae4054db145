//! Bounded exponential backoff for transient provider and index faults.
//!
//! Errors opt in through [`Retryable`]. Validation and authentication
//! failures are never retried; connection, rate-limit, overload and timeout
//! failures are retried up to `max_attempts` total tries.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tether_types::config::RetryConfig;
use tether_types::error::{EmbeddingError, IndexError, SummarizeError};

/// Classification of an error as transient or permanent.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Provider { .. }
            | EmbeddingError::RateLimited
            | EmbeddingError::Overloaded(_)
            | EmbeddingError::Timeout(_) => true,
            EmbeddingError::AuthenticationFailed | EmbeddingError::Malformed(_) => false,
        }
    }
}

impl Retryable for IndexError {
    fn is_retryable(&self) -> bool {
        matches!(self, IndexError::Connection(_) | IndexError::Timeout(_))
    }
}

impl Retryable for SummarizeError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            SummarizeError::Provider { .. } | SummarizeError::RateLimited
        )
    }
}

/// Backoff schedule: `initial * multiplier^n`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry as i32);
        let millis = (self.initial_delay.as_millis() as f64 * factor)
            .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// The last error is returned on exhaustion.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt - 1);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
