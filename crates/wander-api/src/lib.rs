pub mod conversations;
pub mod error;
pub mod middleware;
pub mod notifications;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post},
};

use wander_gateway::ChatHub;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub hub: ChatHub,
    pub jwt_secret: String,
}

/// REST fallback routes. Every route requires a bearer token.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::open_conversation),
        )
        .route("/conversations/{conversation_id}/messages", get(conversations::get_messages))
        .route("/messages", post(conversations::send_message))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/read", patch(notifications::mark_all_read))
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state)
}
