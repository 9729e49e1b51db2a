//! Error types for the reseller monitor

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Maximum number of upstream body bytes kept in an error message
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Cursor persistence error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Network failure talking to an upstream API
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream answered with a non-2xx status
    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Upstream body could not be decoded
    #[error("Malformed upstream response ({bytes} bytes): {reason}")]
    Malformed { bytes: usize, reason: String },

    /// Notification sink rejected a request
    #[error("Notification error: {0}")]
    Notification(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Build an upstream status error, truncating the body
    pub fn upstream(status: u16, body: &str) -> Self {
        let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        AppError::Upstream { status, body }
    }

    /// Build a decode error that records only the payload size
    pub fn malformed(bytes: usize, err: &serde_json::Error) -> Self {
        AppError::Malformed {
            bytes,
            reason: err.to_string(),
        }
    }

    /// Errors that clear up on their own and are retried on the next tick
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Transport(_)
                | AppError::Upstream { .. }
                | AppError::Malformed { .. }
                | AppError::Database(_)
                | AppError::Notification(_)
        )
    }
}

/// Error response structure for API
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status_code, reason) = match &self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            AppError::Transport(_) | AppError::Upstream { .. } | AppError::Malformed { .. } => {
                (StatusCode::BAD_GATEWAY, "upstream_error")
            }
            AppError::Notification(_) => (StatusCode::BAD_GATEWAY, "notification_error"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let error_response = ErrorResponse {
            status: if status_code.is_client_error() {
                "rejected"
            } else {
                "error"
            },
            reason: reason.to_string(),
            details: Some(self.to_string()),
        };

        // Log the error
        tracing::error!(
            error_type = %self,
            status_code = %status_code,
            "Request error"
        );

        (status_code, Json(json!(error_response))).into_response()
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
