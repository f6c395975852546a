//! Normalization of raw upstream events into the canonical envelope.

use chrono::Utc;
use uuid::Uuid;
use webcast_connector::RawEvent;

use crate::dedup::DedupKey;
use crate::event::RelayEvent;

/// Maps raw upstream events to a [`RelayEvent`] plus its [`DedupKey`].
///
/// Dispatch is a closed match over the finite event-kind set; each kind maps
/// to exactly one normalization rule. Key computation, in priority order:
///
/// 1. A gift carrying a streak flag keys on the composite of group id, gift
///    id, sender id and the flag value. A gift whose flag marks a streak
///    still in progress is suppressed entirely; the streak is reported only
///    by its terminating event, which carries the final repeat count.
/// 2. Any event carrying an upstream message id keys on that id.
/// 3. Otherwise the key is synthesized from the current time and a random
///    value. Such a key is unique per event, so this path is not
///    deduplicated by construction; it exists so identifier-less events
///    still flow, at the cost of best-effort dedup.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventNormalizer;

impl EventNormalizer {
    /// Create a normalizer.
    pub fn new() -> Self {
        Self
    }

    /// Normalize a content event for the session streaming as `username`.
    ///
    /// Returns `None` for suppressed events (a gift streak still in
    /// progress). Out-of-band notifications (`Error`, `Disconnected`) are
    /// not content and are handled by the session manager directly; they
    /// also yield `None` here.
    pub fn normalize(&self, username: &str, raw: &RawEvent) -> Option<(RelayEvent, DedupKey)> {
        match raw {
            RawEvent::Gift(gift) => {
                let key = match gift.streak_end {
                    // Streak in progress: only the terminating event is reported.
                    Some(false) => return None,
                    Some(ended) => DedupKey::new(format!(
                        "{}_{}_{}_{}",
                        gift.group_id, gift.gift_id, gift.user.user_id, ended
                    )),
                    None => Self::identifier_key(gift.msg_id.as_deref()),
                };
                let gift_name = gift
                    .gift_name
                    .clone()
                    .unwrap_or_else(|| format!("ID:{}", gift.gift_id));
                let event = RelayEvent::gift(
                    username,
                    &gift.user.unique_id,
                    &gift_name,
                    gift.repeat_count.max(1),
                );
                Some((event, key))
            }
            RawEvent::Chat(chat) => {
                let key = Self::identifier_key(chat.msg_id.as_deref());
                Some((
                    RelayEvent::chat(username, &chat.user.unique_id, &chat.comment),
                    key,
                ))
            }
            RawEvent::Like(like) => {
                let key = Self::identifier_key(like.msg_id.as_deref());
                Some((
                    RelayEvent::like(username, &like.user.unique_id, like.like_count),
                    key,
                ))
            }
            RawEvent::Member(member) => {
                let key = Self::identifier_key(member.msg_id.as_deref());
                Some((RelayEvent::member(username, &member.user.unique_id), key))
            }
            RawEvent::Social(social) => {
                let key = Self::identifier_key(social.msg_id.as_deref());
                Some((RelayEvent::social(username, &social.user.unique_id), key))
            }
            RawEvent::Error { .. } | RawEvent::Disconnected => None,
        }
    }

    /// Key from the upstream message id, or the synthesized fallback.
    fn identifier_key(msg_id: Option<&str>) -> DedupKey {
        match msg_id {
            Some(id) => DedupKey::new(id),
            None => DedupKey::new(format!(
                "{}_{}",
                Utc::now().timestamp_micros(),
                Uuid::new_v4()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, EventPayload};
    use rstest::rstest;
    use webcast_connector::{ChatEvent, GiftEvent, LikeEvent, LiveUser, MemberEvent, SocialEvent};

    fn gift(streak_end: Option<bool>, msg_id: Option<&str>) -> RawEvent {
        RawEvent::Gift(GiftEvent {
            user: LiveUser::new(99, "viewer"),
            gift_id: 5,
            group_id: 1234,
            gift_name: Some("Rose".into()),
            repeat_count: 7,
            streak_end,
            msg_id: msg_id.map(String::from),
        })
    }

    #[test]
    fn streak_in_progress_is_suppressed() {
        let normalizer = EventNormalizer::new();
        assert!(normalizer.normalize("alice", &gift(Some(false), None)).is_none());
    }

    #[test]
    fn streak_end_keys_on_composite_and_reports_final_count() {
        let normalizer = EventNormalizer::new();
        let (event, key) = normalizer
            .normalize("alice", &gift(Some(true), Some("msg-ignored")))
            .expect("terminating event is reported");
        assert_eq!(key.as_str(), "1234_5_99_true");
        assert_eq!(event.kind, EventKind::Gift);
        match event.data.payload {
            EventPayload::Gift { repeat_count, .. } => assert_eq!(repeat_count, 7),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn non_streaking_gift_falls_back_to_msg_id() {
        let normalizer = EventNormalizer::new();
        let (_, key) = normalizer
            .normalize("alice", &gift(None, Some("msg-9")))
            .expect("gift is reported");
        assert_eq!(key.as_str(), "msg-9");
    }

    #[test]
    fn unnamed_gift_uses_id_placeholder() {
        let normalizer = EventNormalizer::new();
        let raw = RawEvent::Gift(GiftEvent {
            user: LiveUser::new(99, "viewer"),
            gift_id: 42,
            group_id: 0,
            gift_name: None,
            repeat_count: 0,
            streak_end: None,
            msg_id: Some("m".into()),
        });
        let (event, _) = normalizer.normalize("alice", &raw).expect("reported");
        match event.data.payload {
            EventPayload::Gift {
                ref gift_name,
                repeat_count,
                ..
            } => {
                assert_eq!(gift_name, "ID:42");
                assert_eq!(repeat_count, 1);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[rstest]
    #[case::chat(RawEvent::Chat(ChatEvent { user: LiveUser::new(1, "v"), comment: "hi".into(), msg_id: Some("c-1".into()) }), EventKind::Chat, "c-1")]
    #[case::like(RawEvent::Like(LikeEvent { user: LiveUser::new(1, "v"), like_count: 3, msg_id: Some("l-1".into()) }), EventKind::Like, "l-1")]
    #[case::member(RawEvent::Member(MemberEvent { user: LiveUser::new(1, "v"), msg_id: Some("m-1".into()) }), EventKind::Member, "m-1")]
    #[case::social(RawEvent::Social(SocialEvent { user: LiveUser::new(1, "v"), msg_id: Some("s-1".into()) }), EventKind::Social, "s-1")]
    fn message_id_is_the_key(
        #[case] raw: RawEvent,
        #[case] kind: EventKind,
        #[case] expected_key: &str,
    ) {
        let normalizer = EventNormalizer::new();
        let (event, key) = normalizer.normalize("alice", &raw).expect("reported");
        assert_eq!(event.kind, kind);
        assert_eq!(key.as_str(), expected_key);
    }

    #[test]
    fn missing_identifier_synthesizes_unique_keys() {
        let normalizer = EventNormalizer::new();
        let raw = RawEvent::Chat(ChatEvent {
            user: LiveUser::new(1, "v"),
            comment: "hi".into(),
            msg_id: None,
        });
        let (_, first) = normalizer.normalize("alice", &raw).expect("reported");
        let (_, second) = normalizer.normalize("alice", &raw).expect("reported");
        // The fallback defeats dedup by construction.
        assert_ne!(first, second);
    }

    #[test]
    fn out_of_band_events_are_not_normalized() {
        let normalizer = EventNormalizer::new();
        let error = RawEvent::Error {
            message: "hiccup".into(),
        };
        assert!(normalizer.normalize("alice", &error).is_none());
        assert!(normalizer.normalize("alice", &RawEvent::Disconnected).is_none());
    }
}
