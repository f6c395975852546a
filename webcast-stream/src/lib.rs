//! # webcast-stream
//!
//! The session-lifecycle and event-fanout engine of webcast-relay.
//!
//! At most one upstream live session exists at a time, owned by
//! [`SessionManager`]. Establishing it goes through [`RetryPolicy`]
//! (exponential backoff for transient failures); once established, raw
//! upstream events flow through [`EventNormalizer`] (canonical envelope plus
//! dedup key), are filtered by [`DedupCache`], and fan out to every
//! registered subscriber via [`Broadcaster`]. Fanout is best-effort: a
//! subscriber that fails delivery is pruned, never retried.
//!
//! The HTTP/WebSocket surface lives in `webcast-server`; the upstream client
//! contract lives in `webcast-connector`.

mod broadcaster;
mod config;
mod dedup;
mod error;
mod event;
mod manager;
mod normalizer;
mod retry;
mod session;

pub use broadcaster::{Broadcaster, SubscriberId};
pub use config::RelayConfig;
pub use dedup::{DedupCache, DedupKey};
pub use error::{RelayError, Result};
pub use event::{EventData, EventKind, EventPayload, RelayEvent};
pub use manager::{SessionManager, TeardownOutcome};
pub use normalizer::EventNormalizer;
pub use retry::{RetryPolicy, Retryable};
pub use session::{Session, SessionState, SessionStatus};
