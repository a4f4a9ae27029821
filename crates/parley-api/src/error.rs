use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, error, warn};

use parley_types::api::ErrorBody;

use crate::identity::Rejection;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    /// Credential failure on the way in.
    #[error("credential rejected: {0}")]
    Rejected(#[from] Rejection),

    /// A guest reached an operation that needs an owner.
    #[error("authentication required")]
    Unauthorized,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("{0}")]
    Conflict(String),

    /// Also covers threads owned by someone else.
    #[error("thread not found")]
    NotFound,

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Rejected(reason) => {
                // Every credential failure looks the same from outside
                match reason {
                    Rejection::IncompleteClaim => warn!("Rejected request: {}", reason),
                    _ => debug!("Rejected request: {}", reason),
                }
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Thread not found".to_string()),
            ApiError::Upstream(detail) => {
                error!("Assistant failed to reply: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Assistant failed to reply".to_string(),
                )
            }
            ApiError::Internal(e) => {
                error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
