use serde::{Deserialize, Serialize};
use validator::Validate;

/// Query string for the candidates endpoint
///
/// Only the lower bound is checked here; the engine clamps to the configured maximum.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CandidatesQuery {
    #[validate(range(min = 1))]
    #[serde(default)]
    pub limit: Option<u16>,
}

/// Request to like or dislike another user
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ActionRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "target_user_id", rename = "targetUserId")]
    pub target_user_id: String,
    /// "like" or "dislike"
    #[validate(length(min = 1))]
    pub action: String,
}

/// Request to block another user
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BlockRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: String,
}

/// Request to send a message
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "receiver_id", rename = "receiverId")]
    pub receiver_id: String,
    pub content: String,
    #[serde(alias = "message_type", rename = "messageType", default)]
    pub message_type: Option<String>,
}
