//! Error types for the webcast-stream crate.

use webcast_connector::ConnectError;

/// Errors from session lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Establishing the upstream session failed, after retries where the
    /// failure class allowed them
    #[error("Failed to establish session for {username} after {attempts} attempt(s): {source}")]
    Establishment {
        /// The username the establishment targeted
        username: String,
        /// How many attempts were made before giving up
        attempts: u32,
        /// The upstream failure that ended the establishment
        #[source]
        source: ConnectError,
    },

    /// The operation targeted a username with no matching active session
    #[error("No active session for {username}")]
    NotFound {
        /// The username the operation targeted
        username: String,
        /// The currently active username, if any
        active: Option<String>,
    },

    /// The operation targeted a username while a different one is active
    #[error("A different user is currently connected: requested {requested}, active {active}")]
    Conflict {
        /// The username the operation targeted
        requested: String,
        /// The username that is actually active
        active: String,
    },
}

impl RelayError {
    /// Actionable guidance for the caller, distinct from the internal fault
    /// detail. Non-empty only for establishment failures.
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            Self::Establishment { .. } => &[
                "Try again in 5-10 minutes",
                "Check if user is currently live",
                "Try a different username",
            ],
            Self::NotFound { .. } | Self::Conflict { .. } => &[],
        }
    }
}

/// Convenience type alias for Results using RelayError.
pub type Result<T> = std::result::Result<T, RelayError>;
