//! # webcast-connector
//!
//! The upstream boundary of webcast-relay: the capability contract for a live
//! streaming connection, expressed as traits so the relay core never depends
//! on a specific platform client.
//!
//! A connector can do exactly three things:
//!
//! - establish a session for a username and report its room id,
//! - deliver raw upstream events (gift, chat, like, member, social) plus
//!   out-of-band notifications (error, disconnected) over a channel,
//! - tear the session down on request (best-effort).
//!
//! Establishment failures are classified as transient (retry-eligible) or
//! permanent, which is the only thing the relay's retry policy needs to know.
//!
//! The crate also ships [`SimulatedConnector`], a scriptable in-memory
//! implementation used by integration tests and the demo server binary. A
//! real platform client plugs in by implementing [`LiveConnector`].

mod connector;
mod error;
mod event;
mod simulated;

pub use connector::{LiveConnector, LiveSession};
pub use error::ConnectError;
pub use event::{ChatEvent, GiftEvent, LikeEvent, LiveUser, MemberEvent, RawEvent, SocialEvent};
pub use simulated::{RoomScript, SimulatedConnector, SimulatedSession};
