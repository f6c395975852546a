//! Capability contract for upstream live connections.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ConnectError;
use crate::event::RawEvent;

/// Factory for upstream live sessions.
///
/// The relay core owns at most one session at a time but may establish and
/// tear down many over its lifetime, so the connector itself is a long-lived,
/// shareable factory. Implementations must be cheap to call concurrently;
/// the relay serializes lifecycle transitions on its side.
#[async_trait]
pub trait LiveConnector: Send + Sync + 'static {
    /// The handle type for an established session.
    type Session: LiveSession;

    /// Establish a live session for `username`.
    ///
    /// Raw events for the session are delivered on `events` until the session
    /// is disconnected or the upstream terminates it (signalled by a final
    /// [`RawEvent::Disconnected`]).
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectError`] classified as transient or permanent; the
    /// caller decides whether to retry based on that classification.
    async fn connect(
        &self,
        username: &str,
        events: mpsc::UnboundedSender<RawEvent>,
    ) -> Result<Self::Session, ConnectError>;
}

/// Handle to an established upstream session.
#[async_trait]
pub trait LiveSession: Send + Sync + 'static {
    /// The upstream room id of the live stream.
    fn room_id(&self) -> &str;

    /// Tear down the session.
    ///
    /// Teardown is best-effort: callers are expected to clear their local
    /// state even when this fails.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::DisconnectFailed`] if the upstream teardown
    /// call errored.
    async fn disconnect(&self) -> Result<(), ConnectError>;
}
