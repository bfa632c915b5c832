//! Database row types. These map directly to SQLite rows; timestamps stay
//! as stored text until converted into `wander-types` models.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use tracing::warn;

use wander_types::models::{
    Conversation, ConversationSummary, Message, MessagePreview, Notification, User,
};

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub created_at: String,
}

pub struct ConversationRow {
    pub id: i64,
    pub participant_low: i64,
    pub participant_high: i64,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub sent_at: String,
}

pub struct NotificationRow {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    pub link_url: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

pub struct ConversationSummaryRow {
    pub id: i64,
    pub created_at: String,
    pub partner_id: i64,
    pub partner_username: Option<String>,
    pub last_content: Option<String>,
    pub last_sender_id: Option<i64>,
    pub last_sent_at: Option<String>,
}

/// Current time in the stored format. Fixed-width, so text order is time order.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone and no fraction.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
        }
    }
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Conversation {
            id: row.id,
            participant_low: row.participant_low,
            participant_high: row.participant_high,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            content: row.content,
            sent_at: parse_timestamp(&row.sent_at),
        }
    }
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: row.id,
            user_id: row.user_id,
            message_text: row.message,
            link_url: row.link_url,
            is_read: row.is_read,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

impl From<ConversationSummaryRow> for ConversationSummary {
    fn from(row: ConversationSummaryRow) -> Self {
        let last_message = match (row.last_content, row.last_sender_id, row.last_sent_at) {
            (Some(content), Some(sender_id), Some(sent_at)) => Some(MessagePreview {
                content,
                sender_id,
                sent_at: parse_timestamp(&sent_at),
            }),
            _ => None,
        };

        ConversationSummary {
            id: row.id,
            partner: User {
                id: row.partner_id,
                username: row.partner_username.unwrap_or_else(|| "unknown".to_string()),
            },
            last_message,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}
