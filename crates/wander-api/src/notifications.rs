use axum::{Extension, Json, extract::State};

use wander_types::api::{Claims, MarkReadResponse, NotificationList};

use crate::AppState;
use crate::error::ApiError;

/// GET /notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<NotificationList>, ApiError> {
    let list = state.hub.notifier.list_notifications(claims.sub).await?;
    Ok(Json(list))
}

/// PATCH /notifications/read
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let updated = state.hub.notifier.mark_all_read(claims.sub).await?;
    Ok(Json(MarkReadResponse { updated }))
}
