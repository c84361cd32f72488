use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Payment required")]
    PaymentRequired,

    #[error("Invalid webhook: {0}")]
    InvalidWebhook(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Payments provider error: {0}")]
    Payments(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Malformed request bodies are reported as validation errors (400), not
/// axum's default 415/422 plain-text rejections.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
            ),
            AppError::PaymentRequired => (
                StatusCode::PAYMENT_REQUIRED,
                "PAYMENT_REQUIRED",
                "An active subscription is required to export".to_string(),
            ),
            AppError::InvalidWebhook(msg) => {
                tracing::warn!("Rejected webhook: {msg}");
                (StatusCode::BAD_REQUEST, "INVALID_WEBHOOK", msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Payments(msg) => {
                tracing::error!("Payments error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PAYMENTS_ERROR",
                    "The payments provider could not complete the request".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
