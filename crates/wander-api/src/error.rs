use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use wander_gateway::ChatError;
use wander_types::api::ErrorBody;

/// HTTP face of [`ChatError`]. Storage failures are logged here and reach
/// the client only as a generic message.
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::AccessDenied => StatusCode::FORBIDDEN,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Storage(source) => {
                error!("Storage failure: {:?}", source);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            Json(ErrorBody {
                error: self.0.client_message(),
            }),
        )
            .into_response()
    }
}
