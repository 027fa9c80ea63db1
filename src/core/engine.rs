use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::core::delivery::{ConnectionHandle, DeliveryHub, DeliveryStatus, LiveConnection, ServerEvent};
use crate::core::selector::CandidateSelector;
use crate::core::store::{include_matches, MessageStore, RelationshipStore, Transition};
use crate::error::{EngineError, Result};
use crate::models::{
    ActOutcome, Conversation, Intent, MatchEvent, MatchRecord, Message, MessageKind, NewMessage,
    ScoredCandidate,
};
use crate::services::ProfileDirectory;

/// Limits applied by the engine
#[derive(Debug, Clone, Copy)]
pub struct EngineLimits {
    pub default_candidates: usize,
    pub max_candidates: usize,
    pub max_message_chars: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            default_candidates: 10,
            max_candidates: 100,
            max_message_chars: 2000,
        }
    }
}

/// Relationship and messaging engine
///
/// Ties the candidate selector, the relationship and message stores, the
/// profile directory and the live delivery hub together. Cheap to clone;
/// all shared state sits behind `Arc`s.
#[derive(Clone)]
pub struct MatchEngine {
    relationships: Arc<dyn RelationshipStore>,
    messages: Arc<dyn MessageStore>,
    directory: Arc<dyn ProfileDirectory>,
    delivery: Arc<DeliveryHub>,
    selector: CandidateSelector,
    match_events: broadcast::Sender<MatchEvent>,
    limits: EngineLimits,
}

impl MatchEngine {
    pub fn new(
        relationships: Arc<dyn RelationshipStore>,
        messages: Arc<dyn MessageStore>,
        directory: Arc<dyn ProfileDirectory>,
        delivery: Arc<DeliveryHub>,
        limits: EngineLimits,
    ) -> Self {
        let (match_events, _) = broadcast::channel(256);

        Self {
            relationships,
            messages,
            directory,
            delivery,
            selector: CandidateSelector::new(),
            match_events,
            limits,
        }
    }

    pub fn delivery(&self) -> &Arc<DeliveryHub> {
        &self.delivery
    }

    /// Ranked candidates for `user_id`, reflecting relationship state at call time
    pub async fn candidates(&self, user_id: &str, limit: Option<usize>) -> Result<Vec<ScoredCandidate>> {
        let limit = limit
            .unwrap_or(self.limits.default_candidates)
            .min(self.limits.max_candidates);

        let viewer = self.directory.get_profile(user_id).await?;
        let excluded = self.relationships.exclusions(user_id).await?;
        let pool = self.directory.list_profiles(user_id, &excluded).await?;
        let pool_size = pool.len();

        let ranked = self.selector.rank(&viewer, pool, &excluded, limit);

        tracing::info!(
            "Returning {} candidates for user {} (pool {}, excluded {})",
            ranked.len(),
            user_id,
            pool_size,
            excluded.len()
        );

        Ok(ranked)
    }

    /// Like or dislike `target`; reports whether the pair is matched afterwards
    ///
    /// Safe to retry: re-liking an already matched pair reports `matched`
    /// again without creating anything or firing another match event.
    pub async fn act(&self, actor: &str, target: &str, intent: Intent) -> Result<ActOutcome> {
        if actor == target {
            return Err(EngineError::Validation("cannot act on yourself".to_string()));
        }
        self.directory.get_profile(target).await?;

        let transition = self.relationships.act(actor, target, intent).await?;

        match transition {
            Transition::Refused => Err(EngineError::Authorization(
                "cannot act on a blocked user".to_string(),
            )),
            Transition::Pending => {
                tracing::debug!("{} -> {} recorded as {:?}", actor, target, intent);
                Ok(ActOutcome { matched: false })
            }
            Transition::Matched { newly, matched_at } => {
                if newly {
                    tracing::info!("New match: {} <-> {}", actor, target);
                    self.announce_match(MatchEvent {
                        user_a: actor.to_string(),
                        user_b: target.to_string(),
                        matched_at,
                    });
                }
                Ok(ActOutcome { matched: true })
            }
        }
    }

    /// Block `target` permanently from `actor`'s side, dissolving any match
    pub async fn block(&self, actor: &str, target: &str) -> Result<()> {
        if actor == target {
            return Err(EngineError::Validation("cannot block yourself".to_string()));
        }
        self.directory.get_profile(target).await?;

        let outcome = self.relationships.block(actor, target).await?;

        tracing::info!(
            "{} blocked {} (match dissolved: {}, repeat: {})",
            actor,
            target,
            outcome.unmatched,
            outcome.already_blocked
        );
        Ok(())
    }

    /// `user_id`'s active matches, newest first
    pub async fn matches(&self, user_id: &str) -> Result<Vec<MatchRecord>> {
        Ok(self.relationships.matches_for(user_id).await?)
    }

    /// Persist a message to a matched user, then push it to their live connection if any
    pub async fn send(
        &self,
        sender: &str,
        receiver: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(EngineError::Validation("message content is required".to_string()));
        }
        if content.chars().count() > self.limits.max_message_chars {
            return Err(EngineError::Validation(format!(
                "message content exceeds {} characters",
                self.limits.max_message_chars
            )));
        }
        if sender == receiver || !self.relationships.is_matched(sender, receiver).await? {
            return Err(EngineError::not_matched());
        }

        let message = self
            .messages
            .insert(NewMessage {
                sender_id: sender.to_string(),
                receiver_id: receiver.to_string(),
                content: content.to_string(),
                kind,
            })
            .await?;

        match self.delivery.deliver(&message) {
            DeliveryStatus::Pushed => tracing::debug!("Message {} pushed to {}", message.id, receiver),
            DeliveryStatus::Offline => tracing::debug!("Message {} stored for offline {}", message.id, receiver),
            DeliveryStatus::Dropped => tracing::warn!("Message {} stored but live push dropped", message.id),
        }

        Ok(message)
    }

    /// Messages between `viewer` and `other`, oldest first; marks `viewer`'s unread ones read
    pub async fn history(&self, viewer: &str, other: &str) -> Result<Vec<Message>> {
        if !self.relationships.is_matched(viewer, other).await? {
            return Err(EngineError::not_matched());
        }

        let marked = self.messages.mark_conversation_read(viewer, other, Utc::now()).await?;
        if marked > 0 {
            tracing::debug!("Marked {} messages from {} read for {}", marked, other, viewer);
        }

        Ok(self.messages.history(viewer, other).await?)
    }

    /// Mark one message read; silently does nothing if missing, not addressed to `viewer`, or already read
    pub async fn mark_read(&self, viewer: &str, message_id: Uuid) -> Result<()> {
        let changed = self.messages.mark_read(viewer, message_id, Utc::now()).await?;
        if !changed {
            tracing::debug!("mark_read on {} by {} had no effect", message_id, viewer);
        }
        Ok(())
    }

    /// Soft-delete a message `actor` sent
    pub async fn delete(&self, actor: &str, message_id: Uuid) -> Result<()> {
        let message = self
            .messages
            .get(message_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("message {}", message_id)))?;

        if message.sender_id != actor {
            return Err(EngineError::Authorization(
                "only the sender can delete a message".to_string(),
            ));
        }

        if !self.messages.soft_delete(actor, message_id).await? {
            // Lost a race with another delete of the same message
            return Err(EngineError::NotFound(format!("message {}", message_id)));
        }

        tracing::debug!("Message {} deleted by {}", message_id, actor);
        Ok(())
    }

    /// One summary per counterpart, most recent activity first
    ///
    /// Active matches nobody has written in yet are listed with no last message.
    pub async fn conversations(&self, viewer: &str) -> Result<Vec<Conversation>> {
        let summaries = self.messages.conversations(viewer).await?;
        let matches = self.relationships.matches_for(viewer).await?;
        Ok(include_matches(summaries, &matches))
    }

    pub fn register_connection(&self, user_id: &str, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.delivery.register_connection(user_id, handle)
    }

    pub fn unregister_connection(&self, user_id: &str) -> bool {
        self.delivery.unregister_connection(user_id)
    }

    /// Open and register a live connection that unregisters itself on drop
    pub fn connect(&self, user_id: &str) -> LiveConnection {
        LiveConnection::open(Arc::clone(&self.delivery), user_id)
    }

    /// Subscribe to newly created matches
    ///
    /// A match racing with itself may be reported more than once; subscribers
    /// must treat repeats as harmless.
    pub fn subscribe_matches(&self) -> broadcast::Receiver<MatchEvent> {
        self.match_events.subscribe()
    }

    pub async fn health_check(&self) -> Result<bool> {
        let relationships = self.relationships.health_check().await?;
        let messages = self.messages.health_check().await?;
        Ok(relationships && messages)
    }

    fn announce_match(&self, event: MatchEvent) {
        // No subscribers is not an error
        let _ = self.match_events.send(event.clone());

        for user in [&event.user_a, &event.user_b] {
            self.delivery.notify(user, ServerEvent::Match(event.clone()));
        }
    }
}
