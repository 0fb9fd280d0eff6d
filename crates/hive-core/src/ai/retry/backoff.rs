//! Exponential backoff with jitter

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Upper bound of the positive jitter applied to each delay (25%)
const MAX_JITTER_FRACTION: f64 = 0.25;

/// Errors raised by the backoff calculation itself
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    #[error("invalid attempt index {attempt}: must be less than max_retries ({max_retries})")]
    InvalidAttempt { attempt: u32, max_retries: u32 },
}

/// Backoff configuration
///
/// `max_retries` is the total number of times an operation is invoked, so a
/// value of 3 means one initial call and up to two retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            max_retries: 3,
        }
    }
}

impl RetryConfig {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64, max_retries: u32) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            max_retries,
        }
    }

    /// Delay to wait after the given (0-based) failed attempt
    ///
    /// `base * 2^attempt` with up to 25% positive jitter, capped at `max_delay_ms`.
    pub fn calculate_delay(&self, attempt: u32) -> Result<Duration, RetryError> {
        if attempt >= self.max_retries {
            return Err(RetryError::InvalidAttempt {
                attempt,
                max_retries: self.max_retries,
            });
        }

        let jitter = rand::thread_rng().gen_range(0.0..=MAX_JITTER_FRACTION);
        Ok(self.delay_with_jitter(attempt, jitter))
    }

    fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        // 2^63 already overflows any sane base; saturate instead of wrapping
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let exponential = self.base_delay_ms.saturating_mul(factor) as f64;
        let jittered = exponential * (1.0 + jitter);
        let capped = jittered.min(self.max_delay_ms as f64);
        Duration::from_millis(capped.round() as u64)
    }

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Trait for errors that can be classified as transient
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

/// Default classifier: every error is considered transient
pub fn always_retry<E>(_error: &E) -> bool {
    true
}

/// Run an operation, retrying errors that report themselves as retryable
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    with_retry_if(config, operation, |e: &E| e.is_retryable()).await
}

/// Run an operation, retrying while `should_retry` accepts the error
///
/// The last error is returned unchanged once attempts are exhausted or the
/// classifier rejects it.
pub async fn with_retry_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let attempts = config.attempts();
    let mut attempt = 0;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("Operation succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !should_retry(&error) {
            debug!("Error is not retryable: {}", error);
            return Err(error);
        }

        if attempt + 1 >= attempts {
            warn!("Giving up after {} attempts: {}", attempts, error);
            return Err(error);
        }

        // attempt + 1 < attempts <= max_retries, so the index is always valid
        let delay = match config.calculate_delay(attempt) {
            Ok(delay) => delay,
            Err(_) => return Err(error),
        };
        warn!(
            "Attempt {}/{} failed: {}. Retrying in {:?}",
            attempt + 1,
            attempts,
            error,
            delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    struct TestError {
        transient: bool,
        id: u32,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error #{}", self.id)
        }
    }

    impl IsRetryable for TestError {
        fn is_retryable(&self) -> bool {
            self.transient
        }
    }

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig::new(1, 5, max_retries)
    }

    #[test]
    fn test_delay_ranges() {
        let config = RetryConfig::new(100, 1000, 3);
        for _ in 0..200 {
            let d0 = config.calculate_delay(0).unwrap().as_millis();
            let d1 = config.calculate_delay(1).unwrap().as_millis();
            let d2 = config.calculate_delay(2).unwrap().as_millis();
            assert!((100..=125).contains(&d0), "delay(0) = {}", d0);
            assert!((200..=250).contains(&d1), "delay(1) = {}", d1);
            assert!((400..=500).contains(&d2), "delay(2) = {}", d2);
        }
    }

    #[test]
    fn test_invalid_attempt() {
        let config = RetryConfig::new(100, 1000, 3);
        assert_eq!(
            config.calculate_delay(3),
            Err(RetryError::InvalidAttempt {
                attempt: 3,
                max_retries: 3
            })
        );
        assert!(config.calculate_delay(10).is_err());
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig::new(100, 300, 5);
        for _ in 0..200 {
            assert!(config.calculate_delay(3).unwrap() <= Duration::from_millis(300));
            assert!(config.calculate_delay(4).unwrap() <= Duration::from_millis(300));
        }
    }

    #[test]
    fn test_delay_without_jitter_is_exact() {
        let config = RetryConfig::new(100, 10_000, 8);
        assert_eq!(config.delay_with_jitter(0, 0.0), Duration::from_millis(100));
        assert_eq!(config.delay_with_jitter(3, 0.0), Duration::from_millis(800));
        assert_eq!(config.delay_with_jitter(3, 0.25), Duration::from_millis(1000));
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let config = RetryConfig::new(100, 2000, u32::MAX);
        assert_eq!(
            config.delay_with_jitter(200, 0.0),
            Duration::from_millis(2000)
        );
    }

    #[tokio::test]
    async fn test_succeeds_after_two_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_config(3), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(TestError {
                    transient: true,
                    id: n,
                })
            } else {
                Ok("ok")
            }
        })
        .await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry_if(
            &fast_config(3),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError {
                    transient: true,
                    id: 7,
                })
            },
            |_| false,
        )
        .await;

        assert_eq!(
            result,
            Err(TestError {
                transient: true,
                id: 7
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry_if(
            &fast_config(4),
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError {
                    transient: true,
                    id: n,
                })
            },
            always_retry,
        )
        .await;

        assert_eq!(
            result,
            Err(TestError {
                transient: true,
                id: 3
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_is_retryable_classifier() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_config(5), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError {
                transient: n == 0,
                id: n,
            })
        })
        .await;

        assert_eq!(result.unwrap_err().id, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
