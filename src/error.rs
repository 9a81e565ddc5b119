// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent callable-style responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
///
/// The first four variants are business-rule failures surfaced to the caller
/// as-is. `Database` and `Internal` are logged and rendered with a generic
/// message.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Canonical status name used in the callable error envelope.
    pub fn status_name(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "UNAUTHENTICATED",
            AppError::InvalidArgument(_) => "INVALID_ARGUMENT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::FailedPrecondition(_) => "FAILED_PRECONDITION",
            AppError::Database(_) | AppError::Internal(_) => "INTERNAL",
        }
    }

    /// HTTP status for this error.
    pub fn http_status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::InvalidArgument(_) | AppError::FailedPrecondition(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for errors that originate in the store or the runtime rather
    /// than in a business rule.
    pub fn is_internal(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Internal(_))
    }
}

/// Error envelope body: `{"error": {"status": ..., "message": ...}}`
#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Unauthenticated(msg)
            | AppError::InvalidArgument(msg)
            | AppError::NotFound(msg)
            | AppError::FailedPrecondition(msg) => msg.clone(),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                "Internal error".to_string()
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                "Internal error".to_string()
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                status: self.status_name(),
                message,
            },
        };

        (self.http_status(), Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
