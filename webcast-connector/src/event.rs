//! Raw upstream event model.
//!
//! These are the events a live connection delivers before the relay
//! normalizes them. Field names follow the upstream payloads: most events
//! carry an optional upstream message id (`msg_id`) which, when present, is
//! the stable identifier used for deduplication.

/// The viewer that triggered an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveUser {
    /// Numeric upstream user id
    pub user_id: u64,
    /// Human-readable unique handle
    pub unique_id: String,
}

impl LiveUser {
    /// Create a new live user.
    pub fn new(user_id: u64, unique_id: impl Into<String>) -> Self {
        Self {
            user_id,
            unique_id: unique_id.into(),
        }
    }
}

/// A gift sent during the stream.
///
/// Gifts can arrive as streaks: the upstream emits one event per repeat with
/// `streak_end = Some(false)` while the streak is running and a final event
/// with `streak_end = Some(true)` carrying the total `repeat_count`. Gifts
/// that cannot streak have `streak_end = None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiftEvent {
    /// The sender of the gift
    pub user: LiveUser,
    /// Upstream gift id
    pub gift_id: u64,
    /// Upstream streak group id
    pub group_id: u64,
    /// Display name of the gift, when the upstream resolves it
    pub gift_name: Option<String>,
    /// Number of repeats so far (final count on the streak-ending event)
    pub repeat_count: u32,
    /// `Some(false)` while a streak is running, `Some(true)` on its final
    /// event, `None` for non-streaking gifts
    pub streak_end: Option<bool>,
    /// Upstream message id, if any
    pub msg_id: Option<String>,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    /// The sender of the message
    pub user: LiveUser,
    /// The message text
    pub comment: String,
    /// Upstream message id, if any
    pub msg_id: Option<String>,
}

/// A batch of likes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeEvent {
    /// The viewer that liked
    pub user: LiveUser,
    /// Number of likes in this batch
    pub like_count: u32,
    /// Upstream message id, if any
    pub msg_id: Option<String>,
}

/// A viewer joined the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEvent {
    /// The viewer that joined
    pub user: LiveUser,
    /// Upstream message id, if any
    pub msg_id: Option<String>,
}

/// A viewer shared the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocialEvent {
    /// The viewer that shared
    pub user: LiveUser,
    /// Upstream message id, if any
    pub msg_id: Option<String>,
}

/// An event delivered by an upstream live session.
///
/// The five content categories map 1:1 onto the upstream subscription
/// categories. `Error` and `Disconnected` are out-of-band notifications:
/// they bypass normalization and deduplication entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// A gift was sent
    Gift(GiftEvent),
    /// A chat message was posted
    Chat(ChatEvent),
    /// Likes were sent
    Like(LikeEvent),
    /// A viewer joined
    Member(MemberEvent),
    /// A viewer shared the stream
    Social(SocialEvent),
    /// The connection reported an error but remains open
    Error {
        /// Upstream error detail
        message: String,
    },
    /// The upstream terminated the session
    Disconnected,
}

impl RawEvent {
    /// The upstream message id carried by this event, if any.
    pub fn msg_id(&self) -> Option<&str> {
        match self {
            Self::Gift(e) => e.msg_id.as_deref(),
            Self::Chat(e) => e.msg_id.as_deref(),
            Self::Like(e) => e.msg_id.as_deref(),
            Self::Member(e) => e.msg_id.as_deref(),
            Self::Social(e) => e.msg_id.as_deref(),
            Self::Error { .. } | Self::Disconnected => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_id_is_surfaced_per_category() {
        let chat = RawEvent::Chat(ChatEvent {
            user: LiveUser::new(1, "viewer"),
            comment: "hello".into(),
            msg_id: Some("msg-42".into()),
        });
        assert_eq!(chat.msg_id(), Some("msg-42"));

        assert_eq!(RawEvent::Disconnected.msg_id(), None);
        let err = RawEvent::Error {
            message: "stream hiccup".into(),
        };
        assert_eq!(err.msg_id(), None);
    }
}
