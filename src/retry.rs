//! Unified retry helper
//!
//! One policy for buys, sells and price fetches: a fixed attempt count with
//! a fixed delay between attempts. The backoff sleep is a cancellation-safe
//! suspension point.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};

/// Retry policy: bounded attempts with a fixed delay between them
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    2000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

/// Run `op` up to `policy.max_attempts` times, sleeping `policy.delay_ms`
/// between attempts.
///
/// Only retryable errors are retried; anything else surfaces immediately.
/// Cancellation is honored during the backoff sleep only, so a cancelled
/// call never interrupts an in-flight attempt.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(
                    "{} attempt {}/{} failed: {} - retrying in {}ms",
                    what, attempt, attempts, e, policy.delay_ms
                );
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(policy.delay_ms)) => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
            Err(e) => {
                warn!("{} attempt {}/{} failed: {}", what, attempt, attempts, e);
                return Err(e);
            }
        }
    }
    unreachable!("retry loop always returns")
}
