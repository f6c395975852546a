//! The canonical event envelope broadcast to subscribers.
//!
//! Wire shape: `{"type": "...", "username": "...", "data": {"timestamp":
//! "...", ...kind-specific fields}}`. Payload fields use camelCase
//! (`giftName`, `repeatCount`, `likeCount`, `roomId`) to match the relay's
//! established wire format.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The closed set of event kinds a subscriber can observe.
///
/// The five content kinds mirror the upstream subscription categories;
/// `error` and `disconnected` relay out-of-band upstream notifications;
/// `connection_opened` and `connection_closed` bracket a session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A gift was sent (streaks report only their terminating event)
    Gift,
    /// A chat message was posted
    Chat,
    /// A batch of likes was sent
    Like,
    /// A viewer joined the stream
    Member,
    /// A viewer shared the stream
    Social,
    /// The upstream connection reported an error
    Error,
    /// The upstream terminated the session
    Disconnected,
    /// A session was established; payload carries the room id
    ConnectionOpened,
    /// A session was torn down
    ConnectionClosed,
}

/// Kind-specific payload fields.
///
/// Serialized untagged and flattened into the `data` object next to the
/// timestamp, so the envelope stays flat on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    /// Payload for [`EventKind::Gift`]
    #[serde(rename_all = "camelCase")]
    Gift {
        /// Handle of the sender
        sender: String,
        /// Display name of the gift
        gift_name: String,
        /// Final repeat count of the streak (1 for non-streaking gifts)
        repeat_count: u32,
    },
    /// Payload for [`EventKind::Chat`]
    Chat {
        /// Handle of the sender
        sender: String,
        /// The message text
        message: String,
    },
    /// Payload for [`EventKind::Like`]
    #[serde(rename_all = "camelCase")]
    Like {
        /// Handle of the sender
        sender: String,
        /// Number of likes in this batch
        like_count: u32,
    },
    /// Payload for [`EventKind::Member`] and [`EventKind::Social`]
    Presence {
        /// Handle of the viewer
        sender: String,
    },
    /// Payload for [`EventKind::Error`]
    Fault {
        /// Upstream error detail
        error: String,
    },
    /// Payload for [`EventKind::ConnectionOpened`]
    #[serde(rename_all = "camelCase")]
    Opened {
        /// Room id of the established session
        room_id: String,
    },
    /// Payload for kinds with no extra fields
    Empty {},
}

/// The `data` object of the envelope: a generation timestamp plus the
/// kind-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventData {
    /// When the relay generated this event
    pub timestamp: DateTime<Utc>,
    /// Kind-specific fields, flattened next to the timestamp
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl EventData {
    fn now(payload: EventPayload) -> Self {
        Self {
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// A normalized event, immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayEvent {
    /// The event kind
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// The streamer username the event belongs to
    pub username: String,
    /// Timestamp and kind-specific fields
    pub data: EventData,
}

impl RelayEvent {
    fn new(kind: EventKind, username: &str, payload: EventPayload) -> Self {
        Self {
            kind,
            username: username.to_string(),
            data: EventData::now(payload),
        }
    }

    /// A gift event carrying the streak's final repeat count.
    pub fn gift(username: &str, sender: &str, gift_name: &str, repeat_count: u32) -> Self {
        Self::new(
            EventKind::Gift,
            username,
            EventPayload::Gift {
                sender: sender.to_string(),
                gift_name: gift_name.to_string(),
                repeat_count,
            },
        )
    }

    /// A chat message.
    pub fn chat(username: &str, sender: &str, message: &str) -> Self {
        Self::new(
            EventKind::Chat,
            username,
            EventPayload::Chat {
                sender: sender.to_string(),
                message: message.to_string(),
            },
        )
    }

    /// A batch of likes.
    pub fn like(username: &str, sender: &str, like_count: u32) -> Self {
        Self::new(
            EventKind::Like,
            username,
            EventPayload::Like {
                sender: sender.to_string(),
                like_count,
            },
        )
    }

    /// A viewer joined.
    pub fn member(username: &str, sender: &str) -> Self {
        Self::new(
            EventKind::Member,
            username,
            EventPayload::Presence {
                sender: sender.to_string(),
            },
        )
    }

    /// A viewer shared the stream.
    pub fn social(username: &str, sender: &str) -> Self {
        Self::new(
            EventKind::Social,
            username,
            EventPayload::Presence {
                sender: sender.to_string(),
            },
        )
    }

    /// An out-of-band upstream error.
    pub fn error(username: &str, detail: &str) -> Self {
        Self::new(
            EventKind::Error,
            username,
            EventPayload::Fault {
                error: detail.to_string(),
            },
        )
    }

    /// The upstream terminated the session.
    pub fn disconnected(username: &str) -> Self {
        Self::new(EventKind::Disconnected, username, EventPayload::Empty {})
    }

    /// A session was established.
    pub fn connection_opened(username: &str, room_id: &str) -> Self {
        Self::new(
            EventKind::ConnectionOpened,
            username,
            EventPayload::Opened {
                room_id: room_id.to_string(),
            },
        )
    }

    /// A session was torn down.
    pub fn connection_closed(username: &str) -> Self {
        Self::new(EventKind::ConnectionClosed, username, EventPayload::Empty {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_value(event: &RelayEvent) -> serde_json::Value {
        serde_json::to_value(event).expect("event serializes")
    }

    #[test]
    fn gift_envelope_shape() {
        let value = to_value(&RelayEvent::gift("alice", "viewer", "Rose", 5));
        assert_eq!(value["type"], "gift");
        assert_eq!(value["username"], "alice");
        assert_eq!(value["data"]["sender"], "viewer");
        assert_eq!(value["data"]["giftName"], "Rose");
        assert_eq!(value["data"]["repeatCount"], 5);
        assert!(value["data"]["timestamp"].is_string());
    }

    #[test]
    fn chat_and_like_envelopes() {
        let chat = to_value(&RelayEvent::chat("alice", "viewer", "hello"));
        assert_eq!(chat["type"], "chat");
        assert_eq!(chat["data"]["message"], "hello");

        let like = to_value(&RelayEvent::like("alice", "viewer", 12));
        assert_eq!(like["type"], "like");
        assert_eq!(like["data"]["likeCount"], 12);
    }

    #[test]
    fn lifecycle_envelopes() {
        let opened = to_value(&RelayEvent::connection_opened("alice", "room-1"));
        assert_eq!(opened["type"], "connection_opened");
        assert_eq!(opened["data"]["roomId"], "room-1");

        let closed = to_value(&RelayEvent::connection_closed("alice"));
        assert_eq!(closed["type"], "connection_closed");
        assert!(closed["data"]["timestamp"].is_string());

        let disconnected = to_value(&RelayEvent::disconnected("alice"));
        assert_eq!(disconnected["type"], "disconnected");
    }

    #[test]
    fn error_envelope_carries_detail() {
        let value = to_value(&RelayEvent::error("alice", "stream hiccup"));
        assert_eq!(value["type"], "error");
        assert_eq!(value["data"]["error"], "stream hiccup");
    }
}
