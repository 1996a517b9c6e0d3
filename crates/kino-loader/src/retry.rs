//! Retry with exponential backoff
//!
//! Only recoverable errors are retried. The loop holds no state outside its
//! own future, so dropping the future aborts it: no further attempt is made
//! and any pending backoff sleep is discarded.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry schedule for one kind of network operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryParameters {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt (milliseconds)
    pub base_delay_ms: u64,
    /// Multiplier applied to the delay after each failed attempt
    pub backoff_factor: f64,
    /// Upper bound on any single delay (milliseconds)
    pub max_delay_ms: u64,
}

impl Default for RetryParameters {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 1000,
            backoff_factor: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryParameters {
    /// Never retry
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after `failed_attempts` failures (1-based)
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1) as i32;
        let delay = self.base_delay_ms as f64 * self.backoff_factor.powi(exponent);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig("max_attempts must be at least 1".into()));
        }
        if !(self.backoff_factor >= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "backoff_factor must be >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        Ok(())
    }
}

/// Run `operation` until it succeeds, fails unrecoverably, or attempts run out
pub async fn with_retry<T, F, Fut>(
    params: &RetryParameters,
    label: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = params.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_recoverable() && attempt < max_attempts => {
                let delay = params.delay_after(attempt);
                warn!(
                    operation = label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                debug!(operation = label, attempt, error = %err, "Giving up");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryParameters {
        RetryParameters {
            max_attempts,
            base_delay_ms: 1,
            backoff_factor: 1.0,
            max_delay_ms: 1,
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let params = RetryParameters {
            max_attempts: 5,
            base_delay_ms: 100,
            backoff_factor: 2.0,
            max_delay_ms: 350,
        };
        assert_eq!(params.delay_after(1), Duration::from_millis(100));
        assert_eq!(params.delay_after(2), Duration::from_millis(200));
        assert_eq!(params.delay_after(3), Duration::from_millis(350));
    }

    #[test]
    fn test_validate() {
        assert!(RetryParameters::default().validate().is_ok());
        assert!(fast(0).validate().is_err());
        let shrinking = RetryParameters {
            backoff_factor: 0.5,
            ..RetryParameters::default()
        };
        assert!(shrinking.validate().is_err());
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(3), "manifest", |_| async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::manifest_fetch("503"))
            } else {
                Ok("parsed")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "parsed");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast(2), "manifest", |_| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::manifest_fetch("timeout"))
        })
        .await;
        assert!(matches!(result, Err(Error::ManifestFetch(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unrecoverable_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast(5), "manifest", |_| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::ManifestParse("not xml".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropping_aborts_pending_retry() {
        let calls = AtomicU32::new(0);
        let slow = RetryParameters {
            max_attempts: 3,
            base_delay_ms: 60_000,
            backoff_factor: 1.0,
            max_delay_ms: 60_000,
        };
        let mut task = tokio_test::task::spawn(with_retry(&slow, "manifest", |_| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::manifest_fetch("503"))
        }));
        tokio_test::assert_pending!(task.poll());
        drop(task);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
