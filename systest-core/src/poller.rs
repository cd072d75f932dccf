//! Readiness polling
//!
//! Converts "eventually true" remote conditions into a definite outcome.
//! Every wait is bounded by a deadline; a probe that itself hangs is cut off
//! at the deadline as well, so a wait never outlives its timeout by more
//! than one tick.

use crate::error::{SystestError, SystestResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, warn};

/// Invoke `probe` every `tick` until it returns true or `timeout` elapses.
///
/// On exhaustion returns [`SystestError::Timeout`] carrying `description`.
pub async fn wait_until<F, Fut>(
    mut probe: F,
    tick: Duration,
    timeout: Duration,
    description: impl Into<String>,
) -> SystestResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let deadline = start + timeout;
    let mut probes = 0u32;

    loop {
        probes += 1;
        if let Ok(true) = timeout_at(deadline, probe()).await {
            debug!("Condition met after {} probes in {:?}", probes, start.elapsed());
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            let description = description.into();
            warn!("{} ({} probes)", description, probes);
            return Err(SystestError::Timeout {
                description,
                duration: timeout,
            });
        }

        sleep(tick.min(deadline - now)).await;
    }
}

/// Make up to `attempts` calls of `probe`, sleeping `spacing` between them.
///
/// Returns the last error when every attempt fails.
pub async fn poll_attempts<F, Fut, T>(
    attempts: u32,
    spacing: Duration,
    mut probe: F,
) -> SystestResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SystestResult<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match probe().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => {
                warn!("Giving up after {} attempts: {}", attempts, e);
                return Err(e);
            }
            Err(e) => {
                debug!("Attempt {}/{} failed: {}", attempt, attempts, e);
                sleep(spacing).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_within_one_tick_of_true() {
        let start = Instant::now();
        let ready_at = start + Duration::from_millis(95);

        wait_until(
            || async move { Instant::now() >= ready_at },
            Duration::from_millis(10),
            Duration::from_secs(1),
            "ready",
        )
        .await
        .unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(95));
        assert!(elapsed <= Duration::from_millis(105));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_with_description() {
        let start = Instant::now();
        let err = wait_until(
            || async { false },
            Duration::from_millis(10),
            Duration::from_secs(10),
            "timeout reached trying to run pgrep netplugin on \"node1\"",
        )
        .await
        .unwrap_err();

        match err {
            SystestError::Timeout {
                description,
                duration,
            } => {
                assert!(description.contains("pgrep netplugin"));
                assert_eq!(duration, Duration::from_secs(10));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_is_cut_off_at_deadline() {
        let start = Instant::now();
        let result = wait_until(
            || async {
                sleep(Duration::from_secs(3600)).await;
                true
            },
            Duration::from_millis(10),
            Duration::from_secs(2),
            "hanging probe",
        )
        .await;

        assert!(result.unwrap_err().is_timeout());
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_attempts_exhausted() {
        let start = Instant::now();
        let calls = AtomicU32::new(0);
        let result: SystestResult<()> = poll_attempts(11, Duration::from_millis(500), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SystestError::internal("down")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 11);
        // ten gaps between eleven attempts
        assert_eq!(start.elapsed(), Duration::from_millis(5000));
    }
}
