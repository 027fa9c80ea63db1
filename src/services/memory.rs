use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::pair::PairKey;
use crate::core::store::{summarize_conversations, BlockOutcome, MessageStore, RelationshipStore, Transition};
use crate::models::{Conversation, EdgeKind, Intent, MatchRecord, Message, NewMessage, RelationshipEdge};
use crate::services::StoreError;

/// Edges from one member of a pair toward the other
#[derive(Debug, Default)]
struct DirectedSlot {
    /// Latest like or dislike; a new one replaces the old
    intent: Option<(EdgeKind, DateTime<Utc>)>,
    blocked_at: Option<DateTime<Utc>>,
}

impl DirectedSlot {
    fn likes(&self) -> bool {
        matches!(self.intent, Some((EdgeKind::Liked, _)))
    }
}

/// Everything known about one unordered pair, guarded by a single mutex
#[derive(Debug)]
struct PairState {
    key: PairKey,
    forward: DirectedSlot,
    backward: DirectedSlot,
    /// Both mirrored match records, created and removed together
    records: Option<[MatchRecord; 2]>,
}

impl PairState {
    fn new(key: PairKey) -> Self {
        Self {
            key,
            forward: DirectedSlot::default(),
            backward: DirectedSlot::default(),
            records: None,
        }
    }

    fn slot(&self, source: &str) -> &DirectedSlot {
        if self.key.is_forward(source) {
            &self.forward
        } else {
            &self.backward
        }
    }

    fn slot_mut(&mut self, source: &str) -> &mut DirectedSlot {
        if self.key.is_forward(source) {
            &mut self.forward
        } else {
            &mut self.backward
        }
    }

    fn is_blocked(&self) -> bool {
        self.forward.blocked_at.is_some() || self.backward.blocked_at.is_some()
    }

    fn record_for(&self, user_id: &str) -> Option<&MatchRecord> {
        self.records
            .as_ref()
            .and_then(|records| records.iter().find(|r| r.user_id == user_id))
    }
}

/// Per-user list of the pair entries each user belongs to
///
/// Appended to once, when a pair entry is created. Per-user reads go through
/// here and never touch the global pair map. Lock order is pair map first,
/// then this index.
struct MemberIndex<T> {
    by_user: RwLock<HashMap<String, Vec<Arc<Mutex<T>>>>>,
}

impl<T> Default for MemberIndex<T> {
    fn default() -> Self {
        Self { by_user: RwLock::new(HashMap::new()) }
    }
}

impl<T> MemberIndex<T> {
    fn add(&self, key: &PairKey, entry: &Arc<Mutex<T>>) {
        let [low, high] = key.members();
        let mut by_user = self.by_user.write();

        by_user.entry(low.to_string()).or_default().push(Arc::clone(entry));
        if high != low {
            by_user.entry(high.to_string()).or_default().push(Arc::clone(entry));
        }
    }

    fn of(&self, user: &str) -> Vec<Arc<Mutex<T>>> {
        self.by_user.read().get(user).cloned().unwrap_or_default()
    }
}

/// In-process relationship store
///
/// The map is a lock table keyed by canonical pair. The outer lock is only
/// held to find or create a pair's entry; transitions run under that pair's
/// own mutex, so unrelated pairs never contend.
#[derive(Default)]
pub struct MemoryRelationshipStore {
    pairs: RwLock<HashMap<PairKey, Arc<Mutex<PairState>>>>,
    members: MemberIndex<PairState>,
}

impl MemoryRelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn pair(&self, key: PairKey) -> Arc<Mutex<PairState>> {
        if let Some(pair) = self.pairs.read().get(&key) {
            return Arc::clone(pair);
        }

        let mut pairs = self.pairs.write();
        match pairs.entry(key) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let pair = Arc::new(Mutex::new(PairState::new(entry.key().clone())));
                self.members.add(entry.key(), &pair);
                Arc::clone(entry.insert(pair))
            }
        }
    }

    fn existing_pair(&self, key: &PairKey) -> Option<Arc<Mutex<PairState>>> {
        self.pairs.read().get(key).map(Arc::clone)
    }

    /// Snapshot of every pair `user` belongs to
    fn pairs_of(&self, user: &str) -> Vec<Arc<Mutex<PairState>>> {
        self.members.of(user)
    }
}

#[async_trait]
impl RelationshipStore for MemoryRelationshipStore {
    async fn act(&self, actor: &str, target: &str, intent: Intent) -> Result<Transition, StoreError> {
        let pair = self.pair(PairKey::new(actor, target));
        let mut state = pair.lock();

        if state.is_blocked() {
            return Ok(Transition::Refused);
        }

        let now = Utc::now();
        state.slot_mut(actor).intent = Some((intent.edge_kind(), now));

        match intent {
            Intent::Dislike => {
                if state.records.take().is_some() {
                    tracing::debug!("Dislike dissolved match {} <-> {}", actor, target);
                }
                Ok(Transition::Pending)
            }
            Intent::Like => {
                if !state.slot(target).likes() {
                    return Ok(Transition::Pending);
                }

                if let Some(existing) = state.record_for(actor) {
                    return Ok(Transition::Matched { newly: false, matched_at: existing.matched_at });
                }

                let record = MatchRecord {
                    user_id: actor.to_string(),
                    other_user_id: target.to_string(),
                    matched_at: now,
                };
                let mirror = record.mirrored();
                state.records = Some([record, mirror]);

                Ok(Transition::Matched { newly: true, matched_at: now })
            }
        }
    }

    async fn block(&self, actor: &str, target: &str) -> Result<BlockOutcome, StoreError> {
        let pair = self.pair(PairKey::new(actor, target));
        let mut state = pair.lock();

        let slot = state.slot_mut(actor);
        let already_blocked = slot.blocked_at.is_some();
        if !already_blocked {
            slot.blocked_at = Some(Utc::now());
        }
        if slot.likes() {
            slot.intent = None;
        }

        let unmatched = state.records.take().is_some();

        Ok(BlockOutcome { unmatched, already_blocked })
    }

    async fn is_matched(&self, a: &str, b: &str) -> Result<bool, StoreError> {
        Ok(self
            .existing_pair(&PairKey::new(a, b))
            .map(|pair| {
                let state = pair.lock();
                state.records.is_some()
            })
            .unwrap_or(false))
    }

    async fn exclusions(&self, user: &str) -> Result<HashSet<String>, StoreError> {
        let mut excluded = HashSet::new();

        for pair in self.pairs_of(user) {
            let state = pair.lock();
            let Some(other) = state.key.other(user) else {
                continue;
            };

            let mine = state.slot(user);
            let theirs = state.slot(other);
            if mine.intent.is_some()
                || mine.blocked_at.is_some()
                || theirs.blocked_at.is_some()
                || state.records.is_some()
            {
                excluded.insert(other.to_string());
            }
        }

        Ok(excluded)
    }

    async fn matches_for(&self, user: &str) -> Result<Vec<MatchRecord>, StoreError> {
        let mut records: Vec<MatchRecord> = self
            .pairs_of(user)
            .into_iter()
            .filter_map(|pair| {
                let state = pair.lock();
                state.record_for(user).cloned()
            })
            .collect();

        records.sort_by(|a, b| {
            b.matched_at
                .cmp(&a.matched_at)
                .then_with(|| a.other_user_id.cmp(&b.other_user_id))
        });
        Ok(records)
    }

    async fn edges_from(&self, user: &str) -> Result<Vec<RelationshipEdge>, StoreError> {
        let mut edges = Vec::new();

        for pair in self.pairs_of(user) {
            let state = pair.lock();
            let Some(other) = state.key.other(user) else {
                continue;
            };
            let slot = state.slot(user);

            if let Some((kind, created_at)) = slot.intent {
                edges.push(RelationshipEdge {
                    source_id: user.to_string(),
                    target_id: other.to_string(),
                    kind,
                    created_at,
                });
            }
            if let Some(created_at) = slot.blocked_at {
                edges.push(RelationshipEdge {
                    source_id: user.to_string(),
                    target_id: other.to_string(),
                    kind: EdgeKind::Blocked,
                    created_at,
                });
            }
        }

        edges.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(edges)
    }
}

/// In-process message store
///
/// Messages live in per-pair threads in insertion order. Creation times are
/// clamped so a thread is never out of timestamp order even if the clock steps back.
#[derive(Default)]
pub struct MemoryMessageStore {
    threads: RwLock<HashMap<PairKey, Arc<Mutex<Vec<Message>>>>>,
    members: MemberIndex<Vec<Message>>,
    locator: RwLock<HashMap<Uuid, PairKey>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn thread(&self, key: PairKey) -> Arc<Mutex<Vec<Message>>> {
        if let Some(thread) = self.threads.read().get(&key) {
            return Arc::clone(thread);
        }

        let mut threads = self.threads.write();
        match threads.entry(key) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let thread = Arc::new(Mutex::new(Vec::new()));
                self.members.add(entry.key(), &thread);
                Arc::clone(entry.insert(thread))
            }
        }
    }

    fn existing_thread(&self, key: &PairKey) -> Option<Arc<Mutex<Vec<Message>>>> {
        self.threads.read().get(key).map(Arc::clone)
    }

    fn locate(&self, id: Uuid) -> Option<Arc<Mutex<Vec<Message>>>> {
        let key = self.locator.read().get(&id).cloned()?;
        self.existing_thread(&key)
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn insert(&self, message: NewMessage) -> Result<Message, StoreError> {
        let key = PairKey::new(&message.sender_id, &message.receiver_id);
        let thread = self.thread(key.clone());

        let stored = {
            let mut messages = thread.lock();
            let now = Utc::now();
            let created_at = match messages.last() {
                Some(last) if last.created_at > now => last.created_at,
                _ => now,
            };

            let stored = Message {
                id: Uuid::new_v4(),
                sender_id: message.sender_id,
                receiver_id: message.receiver_id,
                content: message.content,
                kind: message.kind,
                created_at,
                is_read: false,
                read_at: None,
                is_deleted: false,
            };
            messages.push(stored.clone());
            stored
        };

        self.locator.write().insert(stored.id, key);
        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Message>, StoreError> {
        let Some(thread) = self.locate(id) else {
            return Ok(None);
        };

        let messages = thread.lock();
        Ok(messages.iter().find(|m| m.id == id && !m.is_deleted).cloned())
    }

    async fn history(&self, a: &str, b: &str) -> Result<Vec<Message>, StoreError> {
        let Some(thread) = self.existing_thread(&PairKey::new(a, b)) else {
            return Ok(Vec::new());
        };

        let messages = thread.lock();
        Ok(messages
            .iter()
            .filter(|m| !m.is_deleted && m.involves(a, b))
            .cloned()
            .collect())
    }

    async fn mark_conversation_read(
        &self,
        reader: &str,
        other: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let Some(thread) = self.existing_thread(&PairKey::new(reader, other)) else {
            return Ok(0);
        };

        let mut changed = 0;
        for message in thread.lock().iter_mut() {
            if message.sender_id == other
                && message.receiver_id == reader
                && !message.is_deleted
                && message.mark_read(at)
            {
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn mark_read(&self, reader: &str, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let Some(thread) = self.locate(id) else {
            return Ok(false);
        };

        let mut messages = thread.lock();
        Ok(messages
            .iter_mut()
            .find(|m| m.id == id && m.receiver_id == reader && !m.is_deleted)
            .map(|m| m.mark_read(at))
            .unwrap_or(false))
    }

    async fn soft_delete(&self, sender: &str, id: Uuid) -> Result<bool, StoreError> {
        let Some(thread) = self.locate(id) else {
            return Ok(false);
        };

        let mut messages = thread.lock();
        match messages
            .iter_mut()
            .find(|m| m.id == id && m.sender_id == sender && !m.is_deleted)
        {
            Some(message) => {
                message.is_deleted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn conversations(&self, viewer: &str) -> Result<Vec<Conversation>, StoreError> {
        let mut visible = Vec::new();
        for thread in self.members.of(viewer) {
            visible.extend(thread.lock().iter().filter(|m| !m.is_deleted).cloned());
        }

        Ok(summarize_conversations(viewer, &visible))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageKind;

    fn new_message(sender: &str, receiver: &str, content: &str) -> NewMessage {
        NewMessage {
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            content: content.to_string(),
            kind: MessageKind::Text,
        }
    }

    #[tokio::test]
    async fn test_mutual_like_creates_mirrored_records() {
        let store = MemoryRelationshipStore::new();

        assert_eq!(store.act("alice", "bob", Intent::Like).await.unwrap(), Transition::Pending);
        let second = store.act("bob", "alice", Intent::Like).await.unwrap();
        assert!(matches!(second, Transition::Matched { newly: true, .. }));

        let alice = store.matches_for("alice").await.unwrap();
        let bob = store.matches_for("bob").await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(bob.len(), 1);
        assert_eq!(alice[0].other_user_id, "bob");
        assert_eq!(bob[0].other_user_id, "alice");
        assert_eq!(alice[0].matched_at, bob[0].matched_at);
    }

    #[tokio::test]
    async fn test_repeated_like_is_idempotent() {
        let store = MemoryRelationshipStore::new();
        store.act("alice", "bob", Intent::Like).await.unwrap();
        let first = store.act("bob", "alice", Intent::Like).await.unwrap();
        let again = store.act("bob", "alice", Intent::Like).await.unwrap();

        let Transition::Matched { matched_at, .. } = first else {
            panic!("expected a match");
        };
        assert_eq!(again, Transition::Matched { newly: false, matched_at });
        assert_eq!(store.matches_for("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dislike_replaces_like_and_dissolves_match() {
        let store = MemoryRelationshipStore::new();
        store.act("alice", "bob", Intent::Like).await.unwrap();
        store.act("bob", "alice", Intent::Like).await.unwrap();

        store.act("alice", "bob", Intent::Dislike).await.unwrap();

        assert!(!store.is_matched("alice", "bob").await.unwrap());
        let edges = store.edges_from("alice").await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::Disliked);
    }

    #[tokio::test]
    async fn test_block_removes_match_and_refuses_later_actions() {
        let store = MemoryRelationshipStore::new();
        store.act("alice", "bob", Intent::Like).await.unwrap();
        store.act("bob", "alice", Intent::Like).await.unwrap();

        let outcome = store.block("alice", "bob").await.unwrap();
        assert!(outcome.unmatched);
        assert!(!outcome.already_blocked);
        assert!(!store.is_matched("alice", "bob").await.unwrap());
        assert!(store.matches_for("bob").await.unwrap().is_empty());

        // Bob's like survives but is inert
        let bob_edges = store.edges_from("bob").await.unwrap();
        assert_eq!(bob_edges[0].kind, EdgeKind::Liked);
        assert_eq!(store.act("bob", "alice", Intent::Like).await.unwrap(), Transition::Refused);

        let again = store.block("alice", "bob").await.unwrap();
        assert!(again.already_blocked);
        assert!(!again.unmatched);
    }

    #[tokio::test]
    async fn test_exclusions_cover_both_block_directions() {
        let store = MemoryRelationshipStore::new();
        store.act("alice", "bob", Intent::Like).await.unwrap();
        store.act("alice", "carol", Intent::Dislike).await.unwrap();
        store.block("dave", "alice").await.unwrap();
        store.act("erin", "alice", Intent::Like).await.unwrap();

        let excluded = store.exclusions("alice").await.unwrap();
        assert!(excluded.contains("bob"));
        assert!(excluded.contains("carol"));
        assert!(excluded.contains("dave"));
        // Erin liking Alice does not hide Erin from Alice
        assert!(!excluded.contains("erin"));
        assert!(!excluded.contains("alice"));
    }

    #[tokio::test]
    async fn test_message_thread_roundtrip() {
        let store = MemoryMessageStore::new();
        let first = store.insert(new_message("alice", "bob", "hi")).await.unwrap();
        let second = store.insert(new_message("bob", "alice", "hey")).await.unwrap();

        let history = store.history("bob", "alice").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first.id);
        assert!(history[0].created_at <= history[1].created_at);

        assert!(store.soft_delete("bob", second.id).await.unwrap());
        assert!(!store.soft_delete("bob", second.id).await.unwrap());
        assert!(store.get(second.id).await.unwrap().is_none());
        assert_eq!(store.history("alice", "bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_only_for_receiver() {
        let store = MemoryMessageStore::new();
        let message = store.insert(new_message("alice", "bob", "hi")).await.unwrap();
        let now = Utc::now();

        assert!(!store.mark_read("alice", message.id, now).await.unwrap());
        assert!(store.mark_read("bob", message.id, now).await.unwrap());
        assert!(!store.mark_read("bob", message.id, Utc::now()).await.unwrap());

        let stored = store.get(message.id).await.unwrap().unwrap();
        assert!(stored.is_read);
        assert_eq!(stored.read_at, Some(now));
    }

    #[tokio::test]
    async fn test_per_user_lookups_only_see_own_pairs() {
        let store = MemoryRelationshipStore::new();
        for i in 0..20 {
            store.act(&format!("u{}", i), &format!("v{}", i), Intent::Like).await.unwrap();
        }
        store.act("alice", "bob", Intent::Like).await.unwrap();
        store.act("bob", "alice", Intent::Like).await.unwrap();
        store.act("carol", "alice", Intent::Dislike).await.unwrap();

        assert_eq!(store.pairs_of("alice").len(), 2);
        assert_eq!(store.pairs_of("u3").len(), 1);
        assert!(store.pairs_of("nobody").is_empty());
        assert_eq!(store.matches_for("alice").await.unwrap().len(), 1);

        // Repeated transitions on an existing pair do not grow the index
        store.act("alice", "bob", Intent::Like).await.unwrap();
        assert_eq!(store.pairs_of("bob").len(), 1);
    }

    #[tokio::test]
    async fn test_conversations_only_read_viewer_threads() {
        let store = MemoryMessageStore::new();
        store.insert(new_message("alice", "bob", "hi")).await.unwrap();
        store.insert(new_message("bob", "alice", "hey")).await.unwrap();
        store.insert(new_message("carol", "dave", "unrelated")).await.unwrap();

        assert_eq!(store.members.of("alice").len(), 1);

        let conversations = store.conversations("alice").await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].other_user_id, "bob");
        assert_eq!(conversations[0].unread_count, 1);
        assert!(store.conversations("erin").await.unwrap().is_empty());
    }
}
