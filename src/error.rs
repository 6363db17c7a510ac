use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("already claimed: {0}")]
    AlreadyClaimed(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("cooldown active: next withdrawal possible in {remaining_days} day(s)")]
    CooldownActive { remaining_days: i64 },

    #[error("insufficient balance: short by {shortfall}")]
    InsufficientBalance { shortfall: i64 },

    #[error("a pending withdrawal already exists")]
    DuplicatePendingWithdrawal,

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidTransition(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::AlreadyClaimed(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::PreconditionFailed(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::CooldownActive { .. }
            | AppError::InsufficientBalance { .. }
            | AppError::DuplicatePendingWithdrawal => (StatusCode::CONFLICT, self.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
