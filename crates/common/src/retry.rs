//! Bounded retry with a fixed delay
//!
//! Devices that were just attached often refuse to open for a short while
//! (the OS driver still holds them). [`retry`] re-runs an async operation
//! until it succeeds or the attempt budget is spent.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of retries after the first attempt
pub const DEFAULT_RETRIES: u32 = 10;

/// Default pause between attempts
pub const DEFAULT_DELAY: Duration = Duration::from_millis(200);

/// How often and how patiently to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub retries: u32,
    /// Sleep between two attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Single attempt, no retries
    pub const fn none() -> Self {
        Self {
            retries: 0,
            delay: Duration::ZERO,
        }
    }

    /// Total number of attempts this policy allows
    pub const fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRIES, DEFAULT_DELAY)
    }
}

/// Run `op` until it succeeds, at most `policy.max_attempts()` times
///
/// Sleeps `policy.delay` between attempts and returns the last error once
/// the budget is exhausted.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts() => {
                debug!(
                    "Attempt {}/{} failed: {}, retrying in {:?}",
                    attempt,
                    policy.max_attempts(),
                    e,
                    policy.delay
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!("Giving up after {} attempts: {}", attempt, e);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retries, 10);
        assert_eq!(policy.delay, Duration::from_millis(200));
        assert_eq!(policy.max_attempts(), 11);
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, Duration::from_millis(200));
        let start = tokio::time::Instant::now();

        let counter = attempts.clone();
        let result: Result<&str, String> = retry(policy, || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("busy".to_string())
                } else {
                    Ok("opened")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "opened");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_error_when_exhausted() {
        let attempts = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(2, Duration::from_millis(50));
        let start = tokio::time::Instant::now();

        let counter = attempts.clone();
        let result: Result<(), String> = retry(policy, || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Err(format!("failure {}", n))
            }
        })
        .await;

        assert_eq!(result.unwrap_err(), "failure 2");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sleep_on_first_success() {
        let start = tokio::time::Instant::now();
        let result: Result<u8, String> = retry(RetryPolicy::default(), || async { Ok(1) }).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
