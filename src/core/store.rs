use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::models::{Conversation, Intent, MatchRecord, Message, NewMessage, RelationshipEdge};
use crate::services::StoreError;

/// Outcome of a like/dislike transition on one pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A match exists after the transition. `newly` is true only for the call that created it.
    Matched { newly: bool, matched_at: DateTime<Utc> },
    /// Edge recorded, no match (yet)
    Pending,
    /// Either side holds a block; nothing was written
    Refused,
}

/// Outcome of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOutcome {
    /// A match existed and was dissolved
    pub unmatched: bool,
    /// The actor had already blocked the target
    pub already_blocked: bool,
}

/// Directed edges and mirrored match records
///
/// Implementations must run `act` and `block` as one critical section per
/// unordered pair, and must never hold a lock spanning unrelated pairs.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    async fn act(&self, actor: &str, target: &str, intent: Intent) -> Result<Transition, StoreError>;

    async fn block(&self, actor: &str, target: &str) -> Result<BlockOutcome, StoreError>;

    async fn is_matched(&self, a: &str, b: &str) -> Result<bool, StoreError>;

    /// Everyone `user` must never be offered: liked, disliked, matched,
    /// blocked by `user`, or blocking `user`. Does not include `user`.
    async fn exclusions(&self, user: &str) -> Result<HashSet<String>, StoreError>;

    /// `user`'s side of every active match, newest first
    async fn matches_for(&self, user: &str) -> Result<Vec<MatchRecord>, StoreError>;

    async fn edges_from(&self, user: &str) -> Result<Vec<RelationshipEdge>, StoreError>;

    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(true)
    }
}

/// Durable message storage
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message as unread and not deleted, stamping its creation time
    async fn insert(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// A non-deleted message by id
    async fn get(&self, id: Uuid) -> Result<Option<Message>, StoreError>;

    /// Non-deleted messages between `a` and `b`, oldest first
    async fn history(&self, a: &str, b: &str) -> Result<Vec<Message>, StoreError>;

    /// Mark every unread message from `other` to `reader` as read; returns how many changed
    async fn mark_conversation_read(
        &self,
        reader: &str,
        other: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Mark one message read if `reader` received it and it is unread
    async fn mark_read(&self, reader: &str, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Flag a message deleted if `sender` sent it and it is not yet deleted
    async fn soft_delete(&self, sender: &str, id: Uuid) -> Result<bool, StoreError>;

    /// One summary per counterpart, most recent first
    async fn conversations(&self, viewer: &str) -> Result<Vec<Conversation>, StoreError>;

    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(true)
    }
}

/// Build conversation summaries from a viewer's visible messages
///
/// Shared by backends that cannot aggregate natively.
pub fn summarize_conversations<'a, I>(viewer: &str, messages: I) -> Vec<Conversation>
where
    I: IntoIterator<Item = &'a Message>,
{
    let mut by_counterpart: HashMap<&str, Conversation> = HashMap::new();

    for message in messages {
        if message.is_deleted {
            continue;
        }
        if message.sender_id != viewer && message.receiver_id != viewer {
            continue;
        }

        let unread = u64::from(message.receiver_id == viewer && !message.is_read);
        let other = message.counterpart_of(viewer);

        by_counterpart
            .entry(other)
            .and_modify(|conversation| {
                conversation.unread_count += unread;
                if message.created_at >= conversation.last_activity_at {
                    conversation.last_activity_at = message.created_at;
                    conversation.last_message = Some(message.clone());
                }
            })
            .or_insert_with(|| Conversation {
                other_user_id: other.to_string(),
                last_message: Some(message.clone()),
                unread_count: unread,
                last_activity_at: message.created_at,
            });
    }

    let mut conversations: Vec<Conversation> = by_counterpart.into_values().collect();
    sort_by_activity(&mut conversations);
    conversations
}

/// Add an empty conversation for every active match that has no messages yet
pub fn include_matches(mut conversations: Vec<Conversation>, matches: &[MatchRecord]) -> Vec<Conversation> {
    let known: HashSet<String> = conversations.iter().map(|c| c.other_user_id.clone()).collect();

    conversations.extend(
        matches
            .iter()
            .filter(|record| !known.contains(&record.other_user_id))
            .map(Conversation::for_match),
    );

    sort_by_activity(&mut conversations);
    conversations
}

/// Most recent activity first, ties broken by counterpart id
pub fn sort_by_activity(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| {
        b.last_activity_at
            .cmp(&a.last_activity_at)
            .then_with(|| a.other_user_id.cmp(&b.other_user_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageKind;
    use chrono::Duration;

    fn message(sender: &str, receiver: &str, offset_secs: i64, is_read: bool) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            content: "hi".to_string(),
            kind: MessageKind::Text,
            created_at: DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(offset_secs),
            is_read,
            read_at: None,
            is_deleted: false,
        }
    }

    #[test]
    fn test_summaries_sorted_by_latest_message() {
        let messages = vec![
            message("bob", "alice", 1, false),
            message("carol", "alice", 5, false),
            message("alice", "bob", 10, false),
            message("bob", "alice", 2, true),
        ];

        let conversations = summarize_conversations("alice", &messages);

        assert_eq!(conversations.len(), 2);
        assert_eq!(conversations[0].other_user_id, "bob");
        assert_eq!(conversations[0].unread_count, 1);
        assert_eq!(conversations[0].last_message.as_ref().map(|m| m.sender_id.as_str()), Some("alice"));
        assert_eq!(conversations[1].other_user_id, "carol");
        assert_eq!(conversations[1].unread_count, 1);
    }

    #[test]
    fn test_deleted_and_foreign_messages_are_ignored() {
        let mut deleted = message("bob", "alice", 3, false);
        deleted.is_deleted = true;
        let messages = vec![deleted, message("bob", "carol", 4, false)];

        assert!(summarize_conversations("alice", &messages).is_empty());
    }

    #[test]
    fn test_silent_matches_are_listed_without_message() {
        let messages = vec![message("bob", "alice", 10, false)];
        let matches = vec![
            MatchRecord {
                user_id: "alice".to_string(),
                other_user_id: "bob".to_string(),
                matched_at: DateTime::<Utc>::UNIX_EPOCH,
            },
            MatchRecord {
                user_id: "alice".to_string(),
                other_user_id: "carol".to_string(),
                matched_at: DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(20),
            },
        ];

        let conversations = include_matches(summarize_conversations("alice", &messages), &matches);

        assert_eq!(conversations.len(), 2);
        assert_eq!(conversations[0].other_user_id, "carol");
        assert!(conversations[0].last_message.is_none());
        assert_eq!(conversations[0].unread_count, 0);
        assert_eq!(conversations[1].other_user_id, "bob");
        assert_eq!(conversations[1].unread_count, 1);
    }
}
