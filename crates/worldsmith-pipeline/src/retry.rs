//! Bounded retries with backoff for transport failures.

use std::future::Future;
use std::time::Duration;

use worldsmith_types::{Result, WorldsmithError};

/// Backoff policy controlling the delay between retry attempts.
#[derive(Debug, Clone)]
pub enum BackoffPolicy {
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff: base * 2^attempt, capped at max.
    Exponential { base: Duration, max: Duration },
    /// No delay between retries.
    None,
}

impl BackoffPolicy {
    /// Compute the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        match self {
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::Exponential { base, max } => {
                let millis = (base.as_millis() as u64)
                    .saturating_mul(2u64.saturating_pow(attempt as u32));
                Duration::from_millis(millis).min(*max)
            }
            BackoffPolicy::None => Duration::ZERO,
        }
    }

    /// Delay before retrying after `err`. A provider's `retry_after` hint
    /// wins when it asks for a longer wait.
    fn delay_after(&self, attempt: usize, err: &WorldsmithError) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        match err {
            WorldsmithError::RateLimited { retry_after_ms, .. } => {
                delay.max(Duration::from_millis(*retry_after_ms))
            }
            _ => delay,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

/// Call `f` up to `max_retries + 1` times.
///
/// Only errors satisfying [`WorldsmithError::is_retryable`] are retried; any
/// other error, or the error of the final attempt, is returned as is.
pub async fn execute_with_retry<T, F, Fut>(
    f: F,
    max_retries: usize,
    policy: &BackoffPolicy,
    label: &str,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = policy.delay_after(attempt, &e);
                tracing::warn!(
                    call = %label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retryable error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
