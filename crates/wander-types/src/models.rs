use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = i64;
pub type ConversationId = i64;
pub type MessageId = i64;
pub type NotificationId = i64;

/// Identifies one live WebSocket connection. Never persisted.
pub type ConnId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub participant_low: UserId,
    pub participant_high: UserId,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.participant_low == user_id || self.participant_high == user_id
    }
}

/// A persisted chat message. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub message_text: String,
    pub link_url: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagePreview {
    pub content: String,
    pub sender_id: UserId,
    pub sent_at: DateTime<Utc>,
}

/// One row of a user's conversation list: the other participant plus the
/// newest message, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub partner: User,
    pub last_message: Option<MessagePreview>,
    pub created_at: DateTime<Utc>,
}
