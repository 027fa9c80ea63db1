use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::models::{MatchEvent, Message};

/// Payload pushed to a live connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Message(Message),
    Match(MatchEvent),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Message(_) => "message",
            ServerEvent::Match(_) => "match",
        }
    }
}

/// What happened to a single push attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pushed,
    /// No live connection registered (or it had already gone away)
    Offline,
    /// The connection's buffer was full; the event was discarded
    Dropped,
}

/// Sending half of one live connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    sender: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Best-effort, at-most-once push of events to whoever is connected right now
///
/// Nothing is queued for offline users: durable state lives in the message
/// store and is picked up on the next history or conversations read.
/// Push results never feed back into persistence.
pub struct DeliveryHub {
    connections: RwLock<HashMap<String, ConnectionHandle>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl DeliveryHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    /// Create a connection handle and the receiver its transport should drain
    pub fn open_channel(&self) -> (ConnectionHandle, mpsc::Receiver<ServerEvent>) {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        (ConnectionHandle { id, sender }, receiver)
    }

    /// Register `handle` as the live connection for `user_id`, returning any handle it replaced
    pub fn register_connection(&self, user_id: &str, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        tracing::debug!("Connection {} registered for {}", handle.id, user_id);
        self.connections.write().insert(user_id.to_string(), handle)
    }

    pub fn unregister_connection(&self, user_id: &str) -> bool {
        let removed = self.connections.write().remove(user_id).is_some();
        if removed {
            tracing::debug!("Connection unregistered for {}", user_id);
        }
        removed
    }

    /// Unregister only if `connection_id` is still the current connection for `user_id`
    ///
    /// A connection closing late must not evict the newer one that replaced it.
    pub fn unregister_if_current(&self, user_id: &str, connection_id: u64) -> bool {
        let mut connections = self.connections.write();
        match connections.get(user_id) {
            Some(current) if current.id == connection_id => {
                connections.remove(user_id);
                tracing::debug!("Connection {} unregistered for {}", connection_id, user_id);
                true
            }
            _ => false,
        }
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.connections.read().contains_key(user_id)
    }

    pub fn online_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Push a persisted message to its receiver, if connected
    pub fn deliver(&self, message: &Message) -> DeliveryStatus {
        self.notify(&message.receiver_id, ServerEvent::Message(message.clone()))
    }

    pub fn notify(&self, user_id: &str, event: ServerEvent) -> DeliveryStatus {
        let Some(handle) = self.connections.read().get(user_id).cloned() else {
            return DeliveryStatus::Offline;
        };

        match handle.sender.try_send(event) {
            Ok(()) => DeliveryStatus::Pushed,
            Err(TrySendError::Full(event)) => {
                tracing::warn!("Dropped {} event for {}: connection buffer full", event.name(), user_id);
                DeliveryStatus::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                self.unregister_if_current(user_id, handle.id);
                DeliveryStatus::Offline
            }
        }
    }
}

impl Default for DeliveryHub {
    fn default() -> Self {
        Self::new(64)
    }
}

/// A registered connection that unregisters itself when dropped
pub struct LiveConnection {
    hub: Arc<DeliveryHub>,
    user_id: String,
    id: u64,
    receiver: mpsc::Receiver<ServerEvent>,
}

impl LiveConnection {
    pub fn open(hub: Arc<DeliveryHub>, user_id: &str) -> Self {
        let (handle, receiver) = hub.open_channel();
        let id = handle.id();
        if hub.register_connection(user_id, handle).is_some() {
            tracing::debug!("Replaced previous connection for {}", user_id);
        }

        Self { hub, user_id: user_id.to_string(), id, receiver }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Next pushed event; `None` once the hub has dropped this connection
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.receiver.recv().await
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.hub.unregister_if_current(&self.user_id, self.id);
    }
}
