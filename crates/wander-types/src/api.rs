use serde::{Deserialize, Serialize};

use crate::models::{ConversationId, Notification, UserId};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub username: String,
    pub exp: usize,
}

// -- Conversations --

/// Body of `POST /conversations`.
#[derive(Debug, Default, Deserialize)]
pub struct OpenConversationRequest {
    pub partner_id: Option<UserId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenConversationResponse {
    pub conversation_id: ConversationId,
}

// -- Messages --

/// Body of `POST /messages`. Fields are optional so a missing value is
/// reported as a validation failure rather than a deserialization rejection.
#[derive(Debug, Default, Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: Option<UserId>,
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    /// Only return messages with an id lower than this one.
    pub before: Option<i64>,
    pub limit: Option<u32>,
}

// -- Notifications --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
    #[serde(rename = "unreadCount")]
    pub unread_count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
