//! Error types for upstream connection attempts.

/// Errors from establishing or tearing down an upstream live session.
///
/// The relay's retry policy only distinguishes transient failures (worth
/// retrying with backoff) from permanent ones (fail immediately). Use
/// [`ConnectError::is_transient`] for that classification.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectError {
    /// The upstream platform is rate-limiting connection attempts
    #[error("Rate limited by upstream: {0}")]
    RateLimited(String),

    /// The upstream platform is temporarily unavailable (e.g. HTTP 503)
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// The requested username does not exist upstream
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// The user exists but is not currently live
    #[error("User is not currently live: {0}")]
    NotLive(String),

    /// The username is malformed and was rejected before any network call
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    /// The attempt was superseded by a newer lifecycle operation and its
    /// outcome must be discarded
    #[error("Connection attempt superseded")]
    Superseded,

    /// A network-level failure that is not known to be transient
    #[error("Network error: {0}")]
    Network(String),

    /// The upstream teardown call failed (local state is cleared regardless)
    #[error("Disconnect failed: {0}")]
    DisconnectFailed(String),
}

impl ConnectError {
    /// Whether this failure is worth retrying with backoff.
    ///
    /// Only rate-limiting and upstream-unavailable failures are transient;
    /// everything else fails the establishment immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Unavailable(_))
    }
}
