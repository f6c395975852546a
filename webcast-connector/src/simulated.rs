//! Scriptable in-memory connector.
//!
//! `SimulatedConnector` implements the [`LiveConnector`] contract without any
//! network I/O. Tests and the demo server script which usernames are "live",
//! which connect attempts fail (and how), and what events a session delivers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::connector::{LiveConnector, LiveSession};
use crate::error::ConnectError;
use crate::event::RawEvent;

/// Script for a hosted room: its id and the events delivered as soon as a
/// session is established. The events are re-delivered on every reconnect.
#[derive(Debug, Clone, Default)]
pub struct RoomScript {
    /// Room id reported on successful establishment
    pub room_id: String,
    /// Events sent into the session channel immediately after connect
    pub on_connect: Vec<RawEvent>,
}

#[derive(Debug)]
struct LiveEntry {
    username: String,
    events: mpsc::UnboundedSender<RawEvent>,
}

#[derive(Debug, Default)]
struct SimState {
    /// Usernames that are "live", with their scripts
    rooms: HashMap<String, RoomScript>,
    /// Queued establishment failures, consumed one per connect attempt
    failures: HashMap<String, VecDeque<ConnectError>>,
    /// Established sessions keyed by session id, so a second session for the
    /// same username (e.g. a throwaway probe) never displaces the first
    live: HashMap<u64, LiveEntry>,
    /// Source of session ids
    next_session: u64,
    /// Connect attempts observed per username
    attempts: HashMap<String, u32>,
    /// When set, every disconnect call reports failure
    fail_disconnect: bool,
}

/// In-memory [`LiveConnector`] with scriptable outcomes.
#[derive(Clone, Default)]
pub struct SimulatedConnector {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedConnector {
    /// Create a connector with no live rooms.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `username` as live with the given room id.
    pub fn host(&self, username: impl Into<String>, room_id: impl Into<String>) {
        self.host_script(
            username,
            RoomScript {
                room_id: room_id.into(),
                on_connect: Vec::new(),
            },
        );
    }

    /// Mark `username` as live with a full script.
    pub fn host_script(&self, username: impl Into<String>, script: RoomScript) {
        self.lock().rooms.insert(username.into(), script);
    }

    /// Queue a failure for the next connect attempt for `username`.
    ///
    /// Failures are consumed in FIFO order before the room script applies,
    /// so queuing two transient failures against a hosted room yields
    /// fail, fail, success.
    pub fn fail_next(&self, username: impl Into<String>, error: ConnectError) {
        self.lock()
            .failures
            .entry(username.into())
            .or_default()
            .push_back(error);
    }

    /// Make every subsequent disconnect call report failure.
    pub fn fail_disconnects(&self, fail: bool) {
        self.lock().fail_disconnect = fail;
    }

    /// Deliver an event to every established session for `username`.
    ///
    /// Returns false if no session is established or no channel accepted it.
    pub fn emit(&self, username: &str, event: RawEvent) -> bool {
        let state = self.lock();
        let mut delivered = false;
        for entry in state.live.values() {
            if entry.username == username && entry.events.send(event.clone()).is_ok() {
                delivered = true;
            }
        }
        delivered
    }

    /// Terminate the stream from the upstream side.
    ///
    /// Sends [`RawEvent::Disconnected`] to every session for `username` and
    /// drops their channels.
    pub fn end_stream(&self, username: &str) -> bool {
        let mut state = self.lock();
        let ids: Vec<u64> = state
            .live
            .iter()
            .filter(|(_, entry)| entry.username == username)
            .map(|(id, _)| *id)
            .collect();
        let mut ended = false;
        for id in ids {
            if let Some(entry) = state.live.remove(&id) {
                ended |= entry.events.send(RawEvent::Disconnected).is_ok();
            }
        }
        ended
    }

    /// Whether at least one session is currently established for `username`.
    pub fn is_connected(&self, username: &str) -> bool {
        self.lock()
            .live
            .values()
            .any(|entry| entry.username == username)
    }

    /// Connect attempts observed for `username`.
    pub fn connect_attempts(&self, username: &str) -> u32 {
        self.lock().attempts.get(username).copied().unwrap_or(0)
    }
}

#[async_trait]
impl LiveConnector for SimulatedConnector {
    type Session = SimulatedSession;

    async fn connect(
        &self,
        username: &str,
        events: mpsc::UnboundedSender<RawEvent>,
    ) -> Result<Self::Session, ConnectError> {
        let mut state = self.lock();
        *state.attempts.entry(username.to_string()).or_insert(0) += 1;

        if let Some(queue) = state.failures.get_mut(username) {
            if let Some(error) = queue.pop_front() {
                tracing::debug!(username, %error, "simulated connect failure");
                return Err(error);
            }
        }

        let script = state
            .rooms
            .get(username)
            .cloned()
            .ok_or_else(|| ConnectError::NotLive(username.to_string()))?;

        for event in script.on_connect {
            let _ = events.send(event);
        }
        let session_id = state.next_session;
        state.next_session += 1;
        state.live.insert(
            session_id,
            LiveEntry {
                username: username.to_string(),
                events,
            },
        );

        tracing::debug!(username, room_id = %script.room_id, "simulated connect");
        Ok(SimulatedSession {
            session_id,
            username: username.to_string(),
            room_id: script.room_id,
            state: Arc::clone(&self.state),
        })
    }
}

/// Handle to an established simulated session.
#[derive(Debug)]
pub struct SimulatedSession {
    session_id: u64,
    username: String,
    room_id: String,
    state: Arc<Mutex<SimState>>,
}

#[async_trait]
impl LiveSession for SimulatedSession {
    fn room_id(&self) -> &str {
        &self.room_id
    }

    async fn disconnect(&self) -> Result<(), ConnectError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // Removes only this session's channel; a concurrent session for the
        // same username keeps its own.
        state.live.remove(&self.session_id);
        if state.fail_disconnect {
            return Err(ConnectError::DisconnectFailed(format!(
                "simulated teardown failure for {}",
                self.username
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ChatEvent, LiveUser};

    fn chat(msg_id: &str) -> RawEvent {
        RawEvent::Chat(ChatEvent {
            user: LiveUser::new(7, "viewer"),
            comment: "hi".into(),
            msg_id: Some(msg_id.into()),
        })
    }

    #[tokio::test]
    async fn connect_to_unhosted_username_is_not_live() {
        let connector = SimulatedConnector::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = connector.connect("ghost", tx).await.unwrap_err();
        assert!(matches!(err, ConnectError::NotLive(_)));
    }

    #[tokio::test]
    async fn queued_failures_are_consumed_before_success() {
        let connector = SimulatedConnector::new();
        connector.host("alice", "room-1");
        connector.fail_next("alice", ConnectError::RateLimited("slow down".into()));

        let (tx, _rx) = mpsc::unbounded_channel();
        let err = connector.connect("alice", tx.clone()).await.unwrap_err();
        assert!(err.is_transient());

        let session = connector.connect("alice", tx).await.unwrap();
        assert_eq!(session.room_id(), "room-1");
        assert_eq!(connector.connect_attempts("alice"), 2);
    }

    #[tokio::test]
    async fn scripted_events_arrive_then_live_emits_flow() {
        let connector = SimulatedConnector::new();
        connector.host_script(
            "alice",
            RoomScript {
                room_id: "room-1".into(),
                on_connect: vec![chat("m1")],
            },
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _session = connector.connect("alice", tx).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().msg_id(), Some("m1"));

        assert!(connector.emit("alice", chat("m2")));
        assert_eq!(rx.recv().await.unwrap().msg_id(), Some("m2"));
    }

    #[tokio::test]
    async fn end_stream_delivers_disconnected_and_closes() {
        let connector = SimulatedConnector::new();
        connector.host("alice", "room-1");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _session = connector.connect("alice", tx).await.unwrap();
        assert!(connector.is_connected("alice"));

        assert!(connector.end_stream("alice"));
        assert_eq!(rx.recv().await.unwrap(), RawEvent::Disconnected);
        assert!(!connector.is_connected("alice"));
        assert!(!connector.emit("alice", chat("m3")));
    }

    #[tokio::test]
    async fn second_session_for_the_same_username_is_independent() {
        let connector = SimulatedConnector::new();
        connector.host("alice", "room-1");

        let (tx_first, mut rx_first) = mpsc::unbounded_channel();
        let _first = connector.connect("alice", tx_first).await.unwrap();

        let (tx_second, _rx_second) = mpsc::unbounded_channel();
        let second = connector.connect("alice", tx_second).await.unwrap();
        second.disconnect().await.unwrap();

        // The first session's channel survives the second's teardown.
        assert!(connector.is_connected("alice"));
        assert!(connector.emit("alice", chat("m1")));
        assert_eq!(rx_first.recv().await.unwrap().msg_id(), Some("m1"));
    }

    #[tokio::test]
    async fn disconnect_clears_session_even_when_failing() {
        let connector = SimulatedConnector::new();
        connector.host("alice", "room-1");
        connector.fail_disconnects(true);

        let (tx, _rx) = mpsc::unbounded_channel();
        let session = connector.connect("alice", tx).await.unwrap();
        let err = session.disconnect().await.unwrap_err();
        assert!(matches!(err, ConnectError::DisconnectFailed(_)));
        assert!(!connector.is_connected("alice"));
    }
}
