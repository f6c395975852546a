//! Retry with exponential backoff for session establishment.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use webcast_connector::ConnectError;

/// Classification of a failure as retry-eligible or immediately fatal.
pub trait Retryable {
    /// Whether the failure is worth retrying with backoff.
    fn is_transient(&self) -> bool;
}

impl Retryable for ConnectError {
    fn is_transient(&self) -> bool {
        ConnectError::is_transient(self)
    }
}

/// Retry policy for establishing the upstream session.
///
/// Calls the attempt function up to `max_attempts` times. A permanent
/// failure propagates immediately; a transient failure with attempts
/// remaining waits `backoff_base * 2^(attempt-1)` (attempts counted from 1,
/// exponent capped so the delay cannot overflow) before the next attempt. The backoff is awaited on a tokio timer, so it
/// never blocks unrelated work. The last transient failure propagates once
/// attempts are exhausted.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (at least 1)
    pub max_attempts: u32,
    /// Base duration for the exponential backoff
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Create a policy from its parameters.
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts,
            backoff_base,
        }
    }

    /// Run `attempt_fn` until it succeeds, fails permanently, or attempts
    /// are exhausted. The closure receives the 1-based attempt number.
    pub async fn connect_with_retry<T, E, F, Fut>(&self, mut attempt_fn: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match attempt_fn(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    // Exponent capped so large configured attempt counts
                    // cannot overflow the multiplier.
                    let delay = self
                        .backoff_base
                        .saturating_mul(2u32.pow((attempt - 1).min(16)));
                    tracing::warn!(
                        %error,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "transient establishment failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> ConnectError {
        ConnectError::RateLimited("slow down".into())
    }

    #[tokio::test]
    async fn permanent_failure_makes_exactly_one_attempt() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), ConnectError> = policy
            .connect_with_retry(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ConnectError::NotLive("sleeper".into())) }
            })
            .await;

        assert!(matches!(result, Err(ConnectError::NotLive(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_back_off_exponentially_then_succeed() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: Result<&str, ConnectError> = policy
            .connect_with_retry(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(transient())
                    } else {
                        Ok("room-1")
                    }
                }
            })
            .await;

        assert_eq!(result.expect("third attempt succeeds"), "room-1");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 2s after attempt 1, 4s after attempt 2.
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_propagates_the_last_transient_failure() {
        let policy = RetryPolicy::new(2, Duration::from_secs(2));
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: Result<(), ConnectError> = policy
            .connect_with_retry(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;

        assert!(matches!(result, Err(ConnectError::RateLimited(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // Only the inter-attempt wait; no backoff after the final attempt.
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn large_attempt_counts_cap_the_backoff_instead_of_overflowing() {
        // Past attempt 33 an uncapped 2^(n-1) multiplier would overflow u32.
        let policy = RetryPolicy::new(40, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<&str, ConnectError> = policy
            .connect_with_retry(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 35 {
                        Err(transient())
                    } else {
                        Ok("room-1")
                    }
                }
            })
            .await;

        assert_eq!(result.expect("eventually succeeds"), "room-1");
        assert_eq!(calls.load(Ordering::SeqCst), 35);
    }

    #[tokio::test]
    async fn zero_max_attempts_still_attempts_once() {
        let policy = RetryPolicy::new(0, Duration::from_secs(2));
        let result: Result<&str, ConnectError> =
            policy.connect_with_retry(|_| async { Ok("room-1") }).await;
        assert_eq!(result.expect("attempted once"), "room-1");
    }
}
