//! Tracker error types with HTTP status code mapping.
//!
//! [`TrackerError`] is the central error type of the service. Each variant
//! maps to a numeric code and an HTTP status; the reconciliation engine uses
//! the same type for per-station failures.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{FeedId, FeedUpdateId, StationId};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "feed not found: 7",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Service error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                  |
/// |-----------|-----------------|------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request              |
/// | 2000–2999 | State/Not Found | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server          | 500 Internal Server Error    |
#[derive(Debug, Clone, thiserror::Error)]
pub enum TrackerError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Feed with the given ID was not found.
    #[error("feed not found: {0}")]
    FeedNotFound(FeedId),

    /// Feed update with the given ID was not found.
    #[error("feed update not found: {0}")]
    FeedUpdateNotFound(FeedUpdateId),

    /// Station with the given ID was not found.
    #[error("station not found: {0}")]
    StationNotFound(StationId),

    /// A pass is already running for the feed.
    #[error("a pass is already in progress for feed {0}")]
    PassInProgress(FeedId),

    /// Store read or write failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Stored state contradicts the versioning invariants.
    #[error("inconsistent state: {0}")]
    InconsistentState(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TrackerError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::FeedNotFound(_) => 2001,
            Self::FeedUpdateNotFound(_) => 2002,
            Self::StationNotFound(_) => 2003,
            Self::PassInProgress(_) => 2004,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::InconsistentState(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::FeedNotFound(_) | Self::FeedUpdateNotFound(_) | Self::StationNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::PassInProgress(_) => StatusCode::CONFLICT,
            Self::Persistence(_) | Self::InconsistentState(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<sqlx::Error> for TrackerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<JsonRejection> for TrackerError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for TrackerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants_map_to_404() {
        assert_eq!(
            TrackerError::FeedNotFound(FeedId::new(1)).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            TrackerError::StationNotFound(StationId::new(1)).error_code(),
            2003
        );
    }

    #[test]
    fn pass_in_progress_is_conflict() {
        let err = TrackerError::PassInProgress(FeedId::new(4));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "a pass is already in progress for feed 4");
    }

    #[test]
    fn response_carries_status() {
        let response = TrackerError::InvalidRequest("bad".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
