//! Configuration for the relay engine.

use std::time::Duration;

/// Configuration for [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum establishment attempts per connect request
    /// Default: 3
    pub max_connect_attempts: u32,

    /// Base duration for exponential backoff between attempts;
    /// attempt `n` waits `backoff_base * 2^(n-1)` before attempt `n+1`
    /// Default: 2 seconds
    pub backoff_base: Duration,

    /// Maximum dedup keys retained for one session before the oldest
    /// are evicted
    /// Default: 10 000
    pub dedup_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_connect_attempts: 3,
            backoff_base: Duration::from_secs(2),
            dedup_capacity: 10_000,
        }
    }
}
