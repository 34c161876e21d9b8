use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_retry::{strategy::jitter, RetryIf};

use super::{DataError, DataResult};

/// Bounded retry with exponential backoff.
///
/// The delay before attempt `n + 1` is `min(max_delay, base_delay * 2^(n-1))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Randomize the upper half of each delay
    pub jitter: bool,
}

impl RetryPolicy {
    /// Primary data fetches: 3 attempts, 4s..10s
    pub fn primary() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }

    /// Per-article fetches fail fast since a failure only drops one article: 2 attempts, 2s..4s
    pub fn article() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(4),
            jitter: true,
        }
    }

    /// Backoff schedule between attempts (one entry fewer than `max_attempts`)
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let base = self.base_delay;
        let max = self.max_delay;
        let with_jitter = self.jitter;

        (0..self.max_attempts.saturating_sub(1)).map(move |n| {
            let factor = 2u32.saturating_pow(n as u32);
            let delay = base.saturating_mul(factor).min(max);
            if with_jitter {
                delay / 2 + jitter(delay / 2)
            } else {
                delay
            }
        })
    }
}

/// Run `operation` under `policy`, retrying transient failures.
///
/// Non-retryable errors are returned immediately; otherwise the last error is
/// returned once attempts run out.
pub async fn execute_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> DataResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DataResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0usize;

    let action = || {
        attempt += 1;
        let current = attempt;
        let fut = operation();
        async move {
            let result = fut.await;
            if let Err(e) = &result {
                if !e.is_retryable() {
                    tracing::debug!(label, attempt = current, error = %e, "Non-retryable error");
                } else if current < max_attempts {
                    tracing::warn!(
                        label,
                        attempt = current,
                        max_attempts,
                        error = %e,
                        "Retryable error, backing off"
                    );
                } else {
                    tracing::warn!(label, attempts = current, error = %e, "Retries exhausted");
                }
            }
            result
        }
    };

    RetryIf::spawn(policy.delays(), action, |e: &DataError| e.is_retryable()).await
}
