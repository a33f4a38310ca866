//! Error types for the sync server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pawlog_sync_protocol::OwnerId;
use serde::Serialize;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The batch exceeds the configured maximum.
    #[error("batch of {size} items exceeds the maximum of {max}")]
    BatchTooLarge {
        /// Items in the request.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// No authenticated principal was attached to the request.
    #[error("authentication required: {0}")]
    Unauthenticated(String),

    /// The owner is unknown or belongs to another principal.
    #[error("owner {0} is not accessible to the authenticated principal")]
    Forbidden(OwnerId),

    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The record store failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::BatchTooLarge { .. }
                | ServerError::Unauthenticated(_)
                | ServerError::Forbidden(_)
                | ServerError::NotFound(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            ServerError::Persistence(_) | ServerError::Internal(_) | ServerError::Io(_)
        )
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) | ServerError::BatchTooLarge { .. } => {
                StatusCode::BAD_REQUEST
            }
            ServerError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Persistence(_) | ServerError::Internal(_) | ServerError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<rusqlite::Error> for ServerError {
    fn from(err: rusqlite::Error) -> Self {
        ServerError::Persistence(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::Forbidden(OwnerId::new("pet")).is_client_error());
        assert!(ServerError::Persistence("disk".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            ServerError::Forbidden(OwnerId::new("pet")).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServerError::BatchTooLarge { size: 9, max: 5 }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::Unauthenticated("missing header".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServerError::Persistence("disk".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
