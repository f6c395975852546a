//! Session state and status snapshots.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle state of the single upstream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session exists
    Idle,
    /// Establishment in progress (including retries)
    Connecting,
    /// Session established, events flowing
    Connected,
    /// Teardown in progress
    Disconnecting,
}

/// The single upstream session record.
///
/// Exactly zero or one of these exists process-wide, owned by the session
/// manager. Created when a connect begins, destroyed on disconnect, failure,
/// or upstream-initiated termination.
#[derive(Debug, Clone)]
pub struct Session {
    /// The streamer username the session targets
    pub username: String,
    /// Room id, recorded once establishment succeeds
    pub room_id: Option<String>,
    /// Current lifecycle state
    pub state: SessionState,
    /// When this session record was created
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// A fresh record entering establishment.
    pub fn connecting(username: &str) -> Self {
        Self {
            username: username.to_string(),
            room_id: None,
            state: SessionState::Connecting,
            started_at: Utc::now(),
        }
    }
}

/// Read-only snapshot of the session plus dedup cache occupancy.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Active username, if any
    pub username: Option<String>,
    /// Room id of the established session, if any
    pub room_id: Option<String>,
    /// Current lifecycle state (`Idle` when no session exists)
    pub state: SessionState,
    /// When the current session record was created
    pub started_at: Option<DateTime<Utc>>,
    /// Number of dedup keys recorded for the active session
    pub dedup_entries: usize,
}

impl SessionStatus {
    /// A snapshot representing "no session".
    pub fn idle() -> Self {
        Self {
            username: None,
            room_id: None,
            state: SessionState::Idle,
            started_at: None,
            dedup_entries: 0,
        }
    }

    /// Whether a session is established.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connecting_record_starts_without_room() {
        let session = Session::connecting("alice");
        assert_eq!(session.username, "alice");
        assert_eq!(session.state, SessionState::Connecting);
        assert!(session.room_id.is_none());
    }

    #[test]
    fn idle_snapshot_is_not_connected() {
        let status = SessionStatus::idle();
        assert!(!status.is_connected());
        assert_eq!(status.dedup_entries, 0);
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&SessionState::Connecting).expect("serializes");
        assert_eq!(json, r#""connecting""#);
    }
}
