//! # webcast-server
//!
//! The HTTP and WebSocket surface of webcast-relay. Routes map 1:1 onto the
//! engine's operations:
//!
//! - `GET  /health` — liveness plus a session summary
//! - `GET  /test/:username` — probe whether a username is currently live
//! - `POST /connect/:username` — establish the session
//! - `DELETE /connect/:username` — tear the session down
//! - `GET  /status` — global snapshot
//! - `GET  /status/:username` — snapshot scoped to one username
//! - `POST /shutdown` — force teardown of whatever is active
//! - `GET  /ws` — WebSocket upgrade for event subscribers
//!
//! Response bodies follow the relay's established wire shapes (`success`,
//! `username`, `roomId`, `error`, `suggestions`, `timestamp` fields).

mod routes;
mod ws;

pub use routes::{routes, AppState};
