//! Session lifecycle orchestration.
//!
//! The manager owns the single upstream session and every transition of its
//! state machine: `Idle → Connecting → Connected → Idle` on the success and
//! failure paths, `Connected → Disconnecting → Idle` on explicit teardown or
//! upstream-initiated termination.
//!
//! Serialization and cancellation:
//! - every transition runs under one async mutex, so two concurrent connect
//!   requests can never both observe "no existing session";
//! - an epoch counter is bumped when a new connect or a validated disconnect
//!   begins; the in-flight retry loop checks it before each attempt and
//!   before promoting a success, so a superseded establishment aborts
//!   instead of applying a late result;
//! - status queries read a separate snapshot and never touch the lifecycle
//!   lock, so they stay responsive while establishment or backoff suspends.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, RwLock};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use webcast_connector::{ConnectError, LiveConnector, LiveSession, RawEvent};

use crate::broadcaster::Broadcaster;
use crate::config::RelayConfig;
use crate::dedup::DedupCache;
use crate::error::{RelayError, Result};
use crate::event::RelayEvent;
use crate::normalizer::EventNormalizer;
use crate::retry::RetryPolicy;
use crate::session::{Session, SessionState, SessionStatus};

/// Result of tearing one session down, as reported by force shutdown.
#[derive(Debug, Clone, Serialize)]
pub struct TeardownOutcome {
    /// The username whose session was torn down
    pub username: String,
    /// Whether the upstream teardown call itself succeeded
    pub success: bool,
    /// The teardown error, when it failed (local state is cleared regardless)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The established session tracked under the lifecycle lock.
struct Active<S> {
    username: String,
    handle: S,
    pump: JoinHandle<()>,
    epoch: u64,
}

/// State shared between the manager and the per-session event pump.
struct Shared<S> {
    /// Guards every lifecycle transition
    lifecycle: tokio::sync::Mutex<Option<Active<S>>>,
    /// Read-only copy of the session record for status queries
    snapshot: RwLock<Option<Session>>,
    /// Dedup keys of the active session
    dedup: StdMutex<DedupCache>,
    /// Subscriber fanout
    broadcaster: Arc<Broadcaster>,
    /// Bumped whenever a teardown or a new establishment begins
    epoch: AtomicU64,
}

impl<S: LiveSession> Shared<S> {
    fn lock_dedup(&self) -> MutexGuard<'_, DedupCache> {
        self.dedup.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_snapshot(&self) -> Option<Session> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_snapshot(&self, session: Option<Session>) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn with_snapshot(&self, f: impl FnOnce(&mut Session)) {
        if let Some(session) = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            f(session);
        }
    }

    /// Tear an active session down: stop the pump, best-effort upstream
    /// disconnect, clear dedup state and the snapshot, notify subscribers.
    ///
    /// `connection_closed` is broadcast after the pump has stopped, so it
    /// follows the last content event processed before teardown began.
    async fn teardown(&self, mut active: Active<S>) -> TeardownOutcome {
        self.with_snapshot(|s| s.state = SessionState::Disconnecting);

        active.pump.abort();
        let _ = (&mut active.pump).await;

        let result = active.handle.disconnect().await;
        if let Err(ref error) = result {
            // Teardown is best-effort; local state is cleared regardless.
            tracing::warn!(username = %active.username, %error, "upstream teardown failed");
        }

        self.lock_dedup().reset();
        self.set_snapshot(None);
        self.broadcaster
            .broadcast(&RelayEvent::connection_closed(&active.username));
        tracing::info!(username = %active.username, "session closed");

        TeardownOutcome {
            username: active.username,
            success: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
        }
    }
}

/// Drains one session's raw events through normalize → dedup → broadcast.
///
/// Exits when the channel closes, when its epoch is superseded, or when the
/// upstream terminates the session (which it handles like a disconnect).
fn spawn_pump<S: LiveSession>(
    shared: Arc<Shared<S>>,
    username: String,
    mut events: mpsc::UnboundedReceiver<RawEvent>,
    epoch: u64,
) -> JoinHandle<()> {
    let normalizer = EventNormalizer::new();
    tokio::spawn(async move {
        while let Some(raw) = events.recv().await {
            if shared.epoch.load(Ordering::SeqCst) != epoch {
                break;
            }
            match raw {
                RawEvent::Error { message } => {
                    tracing::warn!(username = %username, error = %message, "upstream reported an error");
                    shared
                        .broadcaster
                        .broadcast(&RelayEvent::error(&username, &message));
                }
                RawEvent::Disconnected => {
                    handle_upstream_termination(&shared, &username, epoch).await;
                    break;
                }
                content => {
                    let Some((event, key)) = normalizer.normalize(&username, &content) else {
                        continue;
                    };
                    let fresh = shared.lock_dedup().record(key);
                    if fresh {
                        shared.broadcaster.broadcast(&event);
                    } else {
                        tracing::trace!(username = %username, kind = ?event.kind, "duplicate suppressed");
                    }
                }
            }
        }
    })
}

/// Upstream-initiated termination: same terminal effect as a disconnect,
/// triggered by the upstream notification instead of a caller.
async fn handle_upstream_termination<S: LiveSession>(
    shared: &Arc<Shared<S>>,
    username: &str,
    epoch: u64,
) {
    let mut guard = shared.lifecycle.lock().await;
    // Another transition may already have superseded this session.
    if !guard.as_ref().is_some_and(|active| active.epoch == epoch) {
        return;
    }
    // The pump is this task; dropping its handle detaches, never aborts.
    drop(guard.take());

    tracing::info!(username, "upstream terminated the session");
    shared.lock_dedup().reset();
    shared.set_snapshot(None);
    shared
        .broadcaster
        .broadcast(&RelayEvent::disconnected(username));
    shared
        .broadcaster
        .broadcast(&RelayEvent::connection_closed(username));
}

/// Owner of the single upstream session.
///
/// See the module docs for the serialization and cancellation model. All
/// methods take `&self`; the manager is shared behind an `Arc` by the server
/// layer.
pub struct SessionManager<C: LiveConnector> {
    connector: Arc<C>,
    retry: RetryPolicy,
    shared: Arc<Shared<C::Session>>,
}

impl<C: LiveConnector> SessionManager<C> {
    /// Create a manager wired to `connector` and `broadcaster`.
    pub fn new(connector: Arc<C>, broadcaster: Arc<Broadcaster>, config: RelayConfig) -> Self {
        Self {
            connector,
            retry: RetryPolicy::new(config.max_connect_attempts, config.backoff_base),
            shared: Arc::new(Shared {
                lifecycle: tokio::sync::Mutex::new(None),
                snapshot: RwLock::new(None),
                dedup: StdMutex::new(DedupCache::new(config.dedup_capacity)),
                broadcaster,
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// The broadcaster subscribers register with.
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.shared.broadcaster
    }

    /// Establish a session for `username`, returning its room id.
    ///
    /// Any existing session (same or different username) is fully torn down
    /// first, including `connection_closed` for the old username and a dedup
    /// reset. Establishment is retried per the configured policy; on success
    /// subscribers observe `connection_opened` (with the room id) before any
    /// content event. On failure the state returns to idle, subscribers
    /// observe an `error` event, and the classified failure is returned.
    pub async fn connect(&self, username: &str) -> Result<String> {
        // Supersede any in-flight establishment before queuing on the lock.
        let my_epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let mut guard = self.shared.lifecycle.lock().await;

        if let Some(active) = guard.take() {
            tracing::info!(old = %active.username, new = username, "replacing active session");
            self.shared.teardown(active).await;
        }

        self.shared.set_snapshot(Some(Session::connecting(username)));
        self.shared.lock_dedup().reset();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let attempts_made = AtomicU32::new(0);
        let outcome = self
            .retry
            .connect_with_retry(|attempt| {
                attempts_made.store(attempt, Ordering::SeqCst);
                let events = event_tx.clone();
                async move {
                    if self.shared.epoch.load(Ordering::SeqCst) != my_epoch {
                        return Err(ConnectError::Superseded);
                    }
                    tracing::info!(username, attempt, "establishing upstream session");
                    self.connector.connect(username, events).await
                }
            })
            .await;

        match outcome {
            Ok(handle) => {
                if self.shared.epoch.load(Ordering::SeqCst) != my_epoch {
                    // A teardown began between the last epoch check and the
                    // upstream success; the late session must not be promoted.
                    if let Err(error) = handle.disconnect().await {
                        tracing::warn!(username, %error, "failed to discard superseded session");
                    }
                    self.shared.set_snapshot(None);
                    return Err(RelayError::Establishment {
                        username: username.to_string(),
                        attempts: attempts_made.load(Ordering::SeqCst),
                        source: ConnectError::Superseded,
                    });
                }

                let room_id = handle.room_id().to_string();
                self.shared.with_snapshot(|s| {
                    s.room_id = Some(room_id.clone());
                    s.state = SessionState::Connected;
                });
                // Opened goes out before the pump starts, so subscribers
                // observe it before any content event of this session.
                self.shared
                    .broadcaster
                    .broadcast(&RelayEvent::connection_opened(username, &room_id));
                let pump = spawn_pump(
                    Arc::clone(&self.shared),
                    username.to_string(),
                    event_rx,
                    my_epoch,
                );
                *guard = Some(Active {
                    username: username.to_string(),
                    handle,
                    pump,
                    epoch: my_epoch,
                });
                tracing::info!(username, room_id = %room_id, "session established");
                Ok(room_id)
            }
            Err(source) => {
                self.shared.set_snapshot(None);
                self.shared
                    .broadcaster
                    .broadcast(&RelayEvent::error(username, &source.to_string()));
                tracing::error!(username, error = %source, "session establishment failed");
                Err(RelayError::Establishment {
                    username: username.to_string(),
                    attempts: attempts_made.load(Ordering::SeqCst),
                    source,
                })
            }
        }
    }

    /// Tear down the session for `username`.
    ///
    /// Fails with `NotFound` when no session matches and `Conflict` (carrying
    /// both names) when a different username is active. Upstream teardown is
    /// best-effort: its error is logged and local state is cleared regardless.
    ///
    /// A disconnect issued while a connect for the same username is mid-retry
    /// takes precedence: the establishment is cancelled and its late success,
    /// if any, is discarded.
    pub async fn disconnect(&self, username: &str) -> Result<()> {
        // Validate against the snapshot, not the lifecycle lock, so a
        // mid-retry establishment is cancelled rather than waited out.
        self.ensure_active(username)?;
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);

        let mut guard = self.shared.lifecycle.lock().await;
        match guard.take() {
            Some(active) if active.username == username => {
                self.shared.teardown(active).await;
                Ok(())
            }
            Some(other) => {
                // A different session slipped in while queuing on the lock.
                let active_name = other.username.clone();
                *guard = Some(other);
                Err(RelayError::Conflict {
                    requested: username.to_string(),
                    active: active_name,
                })
            }
            None => {
                // The establishment this call cancelled never completed;
                // there is nothing left to tear down.
                self.shared.set_snapshot(None);
                Ok(())
            }
        }
    }

    /// Tear down whatever session is active, reporting the outcome.
    ///
    /// The shutdown action itself always succeeds; a failing upstream
    /// teardown is reported in the outcome but is non-fatal.
    pub async fn force_shutdown(&self) -> Option<TeardownOutcome> {
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.shared.lifecycle.lock().await;
        match guard.take() {
            Some(active) => Some(self.shared.teardown(active).await),
            None => {
                self.shared.set_snapshot(None);
                None
            }
        }
    }

    /// Read-only snapshot of the session plus dedup occupancy.
    ///
    /// Never mutates state and never touches the lifecycle lock; safe to
    /// call from any concurrent context.
    pub fn status(&self) -> SessionStatus {
        let dedup_entries = self.shared.lock_dedup().len();
        match self.shared.read_snapshot() {
            Some(session) => SessionStatus {
                username: Some(session.username),
                room_id: session.room_id,
                state: session.state,
                started_at: Some(session.started_at),
                dedup_entries,
            },
            None => SessionStatus {
                dedup_entries,
                ..SessionStatus::idle()
            },
        }
    }

    /// Status scoped to `username`; `NotFound` (carrying the active
    /// username, if any) when it is not the active one.
    pub fn status_for(&self, username: &str) -> Result<SessionStatus> {
        match self.shared.read_snapshot() {
            Some(session) if session.username == username => Ok(self.status()),
            Some(session) => Err(RelayError::NotFound {
                username: username.to_string(),
                active: Some(session.username),
            }),
            None => Err(RelayError::NotFound {
                username: username.to_string(),
                active: None,
            }),
        }
    }

    /// Probe whether `username` is currently live: a single establishment
    /// attempt with a throwaway event channel, torn down immediately. Does
    /// not touch the active session and does not retry.
    pub async fn probe(&self, username: &str) -> std::result::Result<String, ConnectError> {
        let (events, _rx) = mpsc::unbounded_channel();
        let handle = self.connector.connect(username, events).await?;
        let room_id = handle.room_id().to_string();
        if let Err(error) = handle.disconnect().await {
            tracing::warn!(username, %error, "probe teardown failed");
        }
        Ok(room_id)
    }

    fn ensure_active(&self, username: &str) -> Result<()> {
        match self.shared.read_snapshot() {
            None => Err(RelayError::NotFound {
                username: username.to_string(),
                active: None,
            }),
            Some(session) if session.username != username => Err(RelayError::Conflict {
                requested: username.to_string(),
                active: session.username,
            }),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webcast_connector::SimulatedConnector;

    fn manager() -> SessionManager<SimulatedConnector> {
        SessionManager::new(
            Arc::new(SimulatedConnector::new()),
            Arc::new(Broadcaster::new()),
            RelayConfig::default(),
        )
    }

    #[tokio::test]
    async fn status_starts_idle() {
        let manager = manager();
        let status = manager.status();
        assert_eq!(status.state, SessionState::Idle);
        assert!(status.username.is_none());
        assert_eq!(status.dedup_entries, 0);
    }

    #[tokio::test]
    async fn disconnect_without_session_is_not_found() {
        let manager = manager();
        let err = manager.disconnect("alice").await.unwrap_err();
        assert!(matches!(err, RelayError::NotFound { active: None, .. }));
    }

    #[tokio::test]
    async fn scoped_status_without_session_is_not_found() {
        let manager = manager();
        let err = manager.status_for("alice").unwrap_err();
        assert!(matches!(err, RelayError::NotFound { active: None, .. }));
    }

    #[tokio::test]
    async fn force_shutdown_without_session_reports_nothing() {
        let manager = manager();
        assert!(manager.force_shutdown().await.is_none());
    }
}
