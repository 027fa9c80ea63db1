use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::EngineError;

/// Academic year, ordered from earliest to latest program stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Year {
    #[serde(rename = "Integrated")]
    Integrated,
    #[serde(rename = "PG 1st", alias = "PG1st")]
    Pg1st,
    #[serde(rename = "PG 2nd", alias = "PG2nd")]
    Pg2nd,
    #[serde(rename = "Graduate")]
    Graduate,
    #[serde(rename = "PhD")]
    PhD,
}

impl Year {
    pub fn ordinal(self) -> u8 {
        match self {
            Year::Integrated => 1,
            Year::Pg1st => 2,
            Year::Pg2nd => 3,
            Year::Graduate => 4,
            Year::PhD => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Year::Integrated => "Integrated",
            Year::Pg1st => "PG 1st",
            Year::Pg2nd => "PG 2nd",
            Year::Graduate => "Graduate",
            Year::PhD => "PhD",
        }
    }
}

impl FromStr for Year {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Integrated" => Ok(Year::Integrated),
            "PG 1st" | "PG1st" => Ok(Year::Pg1st),
            "PG 2nd" | "PG2nd" => Ok(Year::Pg2nd),
            "Graduate" => Ok(Year::Graduate),
            "PhD" => Ok(Year::PhD),
            other => Err(EngineError::Validation(format!("unknown year: {other:?}"))),
        }
    }
}

impl TryFrom<u8> for Year {
    type Error = EngineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Year::Integrated),
            2 => Ok(Year::Pg1st),
            3 => Ok(Year::Pg2nd),
            4 => Ok(Year::Graduate),
            5 => Ok(Year::PhD),
            other => Err(EngineError::Validation(format!("unknown year ordinal: {other}"))),
        }
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Student profile, owned by the profile service and read-only here
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "firstName", default)]
    pub first_name: String,
    #[serde(rename = "lastName", default)]
    pub last_name: String,
    pub major: String,
    pub year: Year,
    pub age: u8,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(rename = "isActive", default = "default_true")]
    pub is_active: bool,
    #[serde(rename = "isEmailVerified", alias = "isVerified", default)]
    pub is_verified: bool,
}

fn default_true() -> bool { true }

/// Directed relationship kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "edge_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Liked,
    Disliked,
    Blocked,
}

/// What a user declares about another user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Like,
    Dislike,
}

impl Intent {
    pub fn edge_kind(self) -> EdgeKind {
        match self {
            Intent::Like => EdgeKind::Liked,
            Intent::Dislike => EdgeKind::Disliked,
        }
    }
}

impl FromStr for Intent {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "like" => Ok(Intent::Like),
            "dislike" | "pass" => Ok(Intent::Dislike),
            other => Err(EngineError::Validation(format!(
                "action must be one of: like, dislike (got {other:?})"
            ))),
        }
    }
}

/// Directed edge between two users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    #[serde(rename = "sourceId")]
    pub source_id: String,
    #[serde(rename = "targetId")]
    pub target_id: String,
    pub kind: EdgeKind,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// One half of a mirrored match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "otherUserId")]
    pub other_user_id: String,
    #[serde(rename = "matchedAt")]
    pub matched_at: DateTime<Utc>,
}

impl MatchRecord {
    pub fn mirrored(&self) -> MatchRecord {
        MatchRecord {
            user_id: self.other_user_id.clone(),
            other_user_id: self.user_id.clone(),
            matched_at: self.matched_at,
        }
    }
}

/// Emitted once per newly created match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEvent {
    #[serde(rename = "userA")]
    pub user_a: String,
    #[serde(rename = "userB")]
    pub user_b: String,
    #[serde(rename = "matchedAt")]
    pub matched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "message_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Emoji,
}

impl FromStr for MessageKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "emoji" => Ok(MessageKind::Emoji),
            other => Err(EngineError::Validation(format!("unknown message type: {other:?}"))),
        }
    }
}

/// Message between two matched users
///
/// `is_read` only ever goes from false to true; `read_at` is set by the first read.
/// Deleted messages stay stored but are invisible to every read path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    #[serde(rename = "senderId")]
    pub sender_id: String,
    #[serde(rename = "receiverId")]
    pub receiver_id: String,
    pub content: String,
    #[serde(rename = "messageType")]
    pub kind: MessageKind,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "isRead")]
    pub is_read: bool,
    #[serde(rename = "readAt")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(rename = "isDeleted")]
    pub is_deleted: bool,
}

impl Message {
    pub fn involves(&self, a: &str, b: &str) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }

    pub fn counterpart_of(&self, viewer: &str) -> &str {
        if self.sender_id == viewer {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }

    /// Flip to read if unread; returns whether anything changed
    pub fn mark_read(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        self.read_at = Some(at);
        true
    }
}

/// A validated message waiting to be persisted
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub kind: MessageKind,
}

/// Derived per-counterpart summary; never stored
///
/// A fresh match with no messages yet has no `last_message`; its activity
/// time is the moment of matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(rename = "otherUserId")]
    pub other_user_id: String,
    #[serde(rename = "lastMessage")]
    pub last_message: Option<Message>,
    #[serde(rename = "unreadCount")]
    pub unread_count: u64,
    #[serde(rename = "lastActivityAt")]
    pub last_activity_at: DateTime<Utc>,
}

impl Conversation {
    /// Placeholder for a match nobody has written in yet
    pub fn for_match(record: &MatchRecord) -> Self {
        Self {
            other_user_id: record.other_user_id.clone(),
            last_message: None,
            unread_count: 0,
            last_activity_at: record.matched_at,
        }
    }
}

/// Ranked candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub profile: Profile,
    #[serde(rename = "compatibilityScore")]
    pub score: u8,
}

/// Result of a like/dislike action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActOutcome {
    #[serde(rename = "match")]
    pub matched: bool,
}
