use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use wander_gateway::ChatError;
use wander_types::api::{
    Claims, MessageQuery, OpenConversationRequest, OpenConversationResponse, SendMessageRequest,
};
use wander_types::events::SendMessagePayload;
use wander_types::models::{ConversationId, ConversationSummary, Message};

use crate::AppState;
use crate::error::ApiError;

/// GET /conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let conversations = state.hub.relay.list_conversations(claims.sub).await?;
    Ok(Json(conversations))
}

/// POST /conversations — resolve the conversation with `partner_id`, creating
/// it if needed, so a client can join its room before the first message.
pub async fn open_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<OpenConversationRequest>,
) -> Result<Json<OpenConversationResponse>, ApiError> {
    let partner_id = req
        .partner_id
        .ok_or_else(|| ChatError::validation("partner_id is required"))?;
    let conversation_id = state.hub.directory.get_or_create(claims.sub, partner_id).await?;
    Ok(Json(OpenConversationResponse { conversation_id }))
}

/// GET /conversations/{conversation_id}/messages
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<ConversationId>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state
        .hub
        .relay
        .list_messages(conversation_id, claims.sub, query.before, query.limit)
        .await?;
    Ok(Json(messages))
}

/// POST /messages — same effect as the `sendMessage` socket event.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receiver_id = req
        .receiver_id
        .ok_or_else(|| ChatError::validation("receiver_id is required"))?;
    let content = req
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ChatError::validation("content is required"))?;

    let message = state
        .hub
        .relay
        .send(SendMessagePayload {
            sender_id: Some(claims.sub),
            receiver_id: Some(receiver_id),
            message_text: Some(content),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}
