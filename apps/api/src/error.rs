//! Error handling for the Inflo API
//!
//! One error type for every HTTP and WebSocket surface, mapped to status
//! codes through Axum's IntoResponse. Every failure renders the same generic
//! `{"status": "fail"}` envelope so callers never learn which check failed
//! beyond the error code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::IssueError;
use crate::store::StoreError;
use crate::sync::ValidationError;

/// Failure response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always `"fail"`
    pub status: &'static str,
    /// Error code for client-side handling
    pub code: &'static str,
    /// Human-readable error message
    pub message: String,
}

/// Main API error type
#[derive(Error, Debug)]
pub enum ApiError {
    // ========== Validation ==========
    /// Update report or secret failed shape checks
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Secret does not map to a live session
    #[error("unknown or expired secret")]
    UnknownSecret,

    /// Viewer supplied a session id that cannot have been issued
    #[error("malformed session id")]
    InvalidSessionId,

    // ========== Resource Errors ==========
    /// No session under this id (expired or never existed)
    #[error("session not found: {0}")]
    SessionNotFound(String),

    // ========== Store Errors ==========
    /// Session store unreachable or returned something unusable
    #[error("session store error: {0}")]
    Store(#[from] StoreError),

    /// Token generation kept colliding
    #[error("could not issue a unique token after {attempts} attempts")]
    TokenSpaceExhausted { attempts: u32 },

    // ========== Internal Errors ==========
    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal server error (catch-all for unexpected errors)
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            Self::Validation(_) | Self::UnknownSecret | Self::InvalidSessionId => {
                StatusCode::BAD_REQUEST
            }

            // 404 Not Found
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,

            // 503 Service Unavailable
            Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            Self::TokenSpaceExhausted { .. } | Self::Serialization(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the error code string for client-side handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::UnknownSecret => "UNKNOWN_SECRET",
            Self::InvalidSessionId => "INVALID_SESSION_ID",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::Store(_) => "STORE_ERROR",
            Self::TokenSpaceExhausted { .. } => "TOKEN_SPACE_EXHAUSTED",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message shown to the caller
    ///
    /// Parser and backend details stay in the log.
    pub fn client_message(&self) -> String {
        match self {
            Self::Validation(_) => "invalid request".to_string(),
            Self::Store(_) => "session store unavailable".to_string(),
            Self::Serialization(_) | Self::Internal(_) => "internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Response body for this error
    pub fn to_response_body(&self) -> ErrorResponse {
        ErrorResponse {
            status: "fail",
            code: self.error_code(),
            message: self.client_message(),
        }
    }

    /// Log the error with appropriate severity based on status code
    pub fn log(&self) {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::debug!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Client error"
            );
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        (self.status_code(), Json(self.to_response_body())).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

impl From<IssueError> for ApiError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::Exhausted { attempts } => Self::TokenSpaceExhausted { attempts },
            IssueError::Store(e) => Self::Store(e),
        }
    }
}
