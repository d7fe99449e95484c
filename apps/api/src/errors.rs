use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::mail::MailError;

const INTERNAL_MESSAGE: &str = "Internal Server Error";

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// Only the client-safe message reaches the response body; payloads carried by
/// the variants are for server-side logs.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid or expired verification token")]
    InvalidOrExpiredToken,

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Malformed identifier: {0}")]
    MalformedIdentifier(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Rendering faults are ours; anything else means the relay never took the
/// message.
impl From<MailError> for AppError {
    fn from(err: MailError) -> Self {
        match err {
            MailError::Template(e) => AppError::Internal(e.into()),
            other => AppError::DeliveryFailed(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::InvalidOrExpiredToken => (
                StatusCode::UNAUTHORIZED,
                "Invalid or expired sign-in link".to_string(),
            ),
            AppError::InvalidEmail(_) => {
                (StatusCode::BAD_REQUEST, "Invalid email address".to_string())
            }
            AppError::DeliveryFailed(msg) => {
                tracing::error!("Sign-in email delivery failed: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "Unable to send sign-in email".to_string(),
                )
            }
            AppError::MalformedIdentifier(_) => (
                StatusCode::BAD_REQUEST,
                "Invalid ID format from URL".to_string(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
