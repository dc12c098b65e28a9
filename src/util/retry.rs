//! Retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::ColloquyError;

/// Upper bound on a computed backoff. Server retry hints are not capped.
pub const MAX_DELAY: Duration = Duration::from_secs(60);

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Wait before the first retry.
    pub base_interval: Duration,
    /// Backoff multiplier applied per attempt.
    pub backoff_factor: f64,
    /// Fraction of the computed wait used as uniform +/- jitter, in `[0, 1]`.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_interval: Duration::from_millis(100),
            backoff_factor: 2.0,
            jitter_ratio: 0.5,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff before retry number `attempt` (zero-based), without jitter.
    /// Saturates at [`MAX_DELAY`].
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = if self.backoff_factor.is_finite() {
            self.backoff_factor.max(1.0)
        } else {
            1.0
        };
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        saturating_secs(self.base_interval.as_secs_f64() * factor.powi(exponent))
    }

    /// Backoff before retry number `attempt` with jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt).as_secs_f64();
        let ratio = if self.jitter_ratio.is_nan() {
            0.0
        } else {
            self.jitter_ratio.clamp(0.0, 1.0)
        };
        if ratio == 0.0 || base == 0.0 {
            return saturating_secs(base);
        }
        let spread = base * ratio;
        let jittered = base + rand::thread_rng().gen_range(-spread..=spread);
        saturating_secs(jittered)
    }

    /// Execute an async operation with retry.
    ///
    /// Non-retryable errors are returned as-is. When every attempt fails with
    /// a retryable error the last one is wrapped in
    /// [`ColloquyError::RetriesExhausted`].
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, ColloquyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ColloquyError>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            attempt += 1;
            if attempt >= max_attempts {
                return Err(ColloquyError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let backoff = self.delay_for(attempt - 1);
            let wait = match err.retry_after() {
                Some(hint) => hint.max(backoff),
                None => backoff,
            };

            tracing::warn!(
                attempt,
                max_attempts,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "Retrying after error"
            );

            tokio::time::sleep(wait).await;
        }
    }
}

fn saturating_secs(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs)
        .unwrap_or(MAX_DELAY)
        .min(MAX_DELAY)
}
