//! Randomized exponential backoff for response delivery.

use std::future::Future;
use std::time::Duration as StdDuration;

use tracing::warn;

/// Backoff settings for [`with_retries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOptions {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Upper bound of the first randomized sleep; doubled after every failure.
    pub base_delay: StdDuration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            retries: 5,
            base_delay: StdDuration::from_millis(1000),
        }
    }
}

impl RetryOptions {
    /// Total number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Upper bound of the total time spent sleeping between attempts.
    ///
    /// Saturates at [`StdDuration::MAX`].
    pub fn max_total_delay(&self) -> StdDuration {
        (0..self.retries).fold(StdDuration::ZERO, |total, attempt| {
            total.saturating_add(self.base_delay.saturating_mul(2u32.saturating_pow(attempt)))
        })
    }
}

fn jittered(bound: StdDuration) -> StdDuration {
    let millis = u64::try_from(bound.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 {
        return StdDuration::ZERO;
    }
    StdDuration::from_millis(fastrand::u64(0..millis))
}

/// Runs `f` until it succeeds or the retries are used up.
///
/// Every failure is retried; the last error is returned once the budget is
/// exhausted.
pub async fn with_retries<F, Fut, T, E>(options: RetryOptions, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut remaining = options.retries;
    let mut bound = options.base_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if remaining == 0 {
                    warn!(
                        error = %error,
                        attempt = attempt,
                        "retries exhausted"
                    );
                    return Err(error);
                }
                remaining -= 1;

                let delay = jittered(bound);
                warn!(
                    error = %error,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                bound = bound.saturating_mul(2);
            }
        }
    }
}
