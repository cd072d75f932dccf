//! Retry with a fixed backoff for transient failures
//!
//! [`retry`] re-runs an async operation while a classifier says the error is
//! worth another attempt. The executor uses it with
//! [`SystestError::is_transient`] and a short fixed delay.

use crate::error::{SystestError, SystestResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial attempt)
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
    /// Classifier: should this error be retried?
    pub is_retryable: fn(&SystestError) -> bool,
    pub operation_name: Option<String>,
}

impl RetryConfig {
    /// Retry policy for remote commands: fixed short backoff on dropped sessions
    pub fn for_transport(attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: attempts,
            delay,
            is_retryable: SystestError::is_transient,
            operation_name: Some("remote_command".to_string()),
        }
    }

    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

/// Retry an async operation with the given configuration
pub async fn retry<F, Fut, T>(config: &RetryConfig, mut operation: F) -> SystestResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SystestResult<T>>,
{
    let operation_name = config.operation_name.as_deref().unwrap_or("operation");
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded after {} attempts", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(error) => {
                if !(config.is_retryable)(&error) {
                    return Err(error);
                }

                if attempt >= config.max_attempts {
                    warn!(
                        "{}: max retry attempts ({}) reached",
                        operation_name, config.max_attempts
                    );
                    return Err(error);
                }

                warn!(
                    "Retry attempt {}/{} for {} after error: {} (waiting {:?})",
                    attempt, config.max_attempts, operation_name, error, config.delay
                );

                sleep(config.delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn eof() -> SystestError {
        SystestError::transport("node1", "ssh: unexpected EOF")
    }

    #[tokio::test]
    async fn test_successful_on_first_attempt() {
        let config = RetryConfig::for_transport(3, Duration::from_millis(10));
        let counter = Arc::new(AtomicU32::new(0));

        let result = retry(&config, || {
            let count = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(count) }
        })
        .await
        .unwrap();

        assert_eq!(result, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_on_transient_failure() {
        let config = RetryConfig::for_transport(5, Duration::from_millis(100));
        let counter = Arc::new(AtomicU32::new(0));

        let result = retry(&config, || {
            let count = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(eof())
                } else {
                    Ok(count)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returned_immediately() {
        let config = RetryConfig::for_transport(5, Duration::from_millis(10));
        let counter = Arc::new(AtomicU32::new(0));

        let result: SystestResult<()> = retry(&config, || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(SystestError::command_failed("node1", "false", Some(1), "")) }
        })
        .await;

        assert!(matches!(result, Err(SystestError::CommandFailed { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_attempts_exceeded() {
        let config = RetryConfig::for_transport(4, Duration::from_millis(100));
        let counter = Arc::new(AtomicU32::new(0));

        let result: SystestResult<()> = retry(&config, || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(eof()) }
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_backoff_spacing() {
        let start = tokio::time::Instant::now();
        let config = RetryConfig::for_transport(3, Duration::from_millis(100));

        let _: SystestResult<()> = retry(&config, || async { Err(eof()) }).await;

        // two sleeps between three attempts
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_custom_classifier() {
        let config = RetryConfig {
            is_retryable: |e| matches!(e, SystestError::CommandFailed { .. }),
            ..RetryConfig::for_transport(3, Duration::from_millis(1))
        };
        let counter = Arc::new(AtomicU32::new(0));

        let _: SystestResult<()> = retry(&config, || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(SystestError::command_failed("n", "x", Some(1), "")) }
        })
        .await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
