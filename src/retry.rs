use std::future::Future;
use std::time::Duration;

use rand::Rng as _;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Backoff configuration. Delays double from `base_delay` up to `max_delay`;
/// setting both to the same value gives a fixed interval. A random jitter of
/// up to `base_delay / 2` is added so parallel workers waiting on the same
/// server do not retry in lockstep.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 29,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    /// Fixed-interval policy: `attempts` total tries, `interval` apart.
    pub fn fixed(attempts: u32, interval: Duration) -> Self {
        Self {
            max_retries: attempts.saturating_sub(1),
            base_delay: interval,
            max_delay: interval,
        }
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        let capped = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter_ms = (self.base_delay.as_millis() / 2) as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        } else {
            Duration::ZERO
        };
        capped + jitter
    }
}

/// Retry an async operation with backoff.
///
/// Returns the first `Ok`, or the last error once retries are exhausted or
/// the classifier returns `Abort`.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    config: &RetryConfig,
    classifier: C,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total_attempts = config.total_attempts();
    let mut attempt = 0;
    loop {
        let err = match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => e,
        };
        attempt += 1;
        if classifier(&err) == RetryAction::Abort || attempt >= total_attempts {
            return Err(err);
        }
        let delay = config.delay_for_retry(attempt - 1);
        tracing::debug!(
            attempt,
            total_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retryable error, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn instant(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_default_config_is_thirty_fixed_attempts() {
        let config = RetryConfig::default();
        assert_eq!(config.total_attempts(), 30);
        assert_eq!(config.base_delay, config.max_delay);
    }

    #[test]
    fn test_fixed_policy() {
        let config = RetryConfig::fixed(30, Duration::from_secs(2));
        assert_eq!(config.max_retries, 29);
        for retry in [0, 1, 5, 28] {
            let d = config.delay_for_retry(retry);
            assert!(d >= Duration::from_secs(2) && d < Duration::from_secs(3));
        }
        assert_eq!(RetryConfig::fixed(0, Duration::ZERO).total_attempts(), 1);
    }

    #[test]
    fn test_delay_exponential_backoff() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        };
        let d = config.delay_for_retry(0);
        assert!(d >= Duration::from_secs(2) && d < Duration::from_secs(3));
        let d = config.delay_for_retry(2);
        assert!(d >= Duration::from_secs(8) && d < Duration::from_secs(9));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig {
            max_retries: 40,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
        };
        let d = config.delay_for_retry(40);
        assert!(d >= Duration::from_secs(30) && d < Duration::from_millis(32_500));
    }

    #[test]
    fn test_delay_zero_base() {
        assert_eq!(instant(3).delay_for_retry(0), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let result: Result<i32, String> =
            retry_with_backoff(&instant(3), |_| RetryAction::Retry, || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_abort_on_non_retryable() {
        let calls = Arc::new(AtomicU32::new(0));
        let cc = calls.clone();
        let result: Result<i32, String> = retry_with_backoff(
            &instant(3),
            |_| RetryAction::Abort,
            || {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err("fatal".to_string())
                }
            },
        )
        .await;
        assert_eq!(result.unwrap_err(), "fatal");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let cc = calls.clone();
        let result: Result<i32, String> = retry_with_backoff(
            &instant(3),
            |_| RetryAction::Retry,
            || {
                let cc = cc.clone();
                async move {
                    if cc.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok(99)
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let cc = calls.clone();
        let result: Result<i32, String> = retry_with_backoff(
            &instant(2),
            |_| RetryAction::Retry,
            || {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err("still failing".to_string())
                }
            },
        )
        .await;
        assert_eq!(result.unwrap_err(), "still failing");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
