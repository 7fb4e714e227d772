//! API error types.
//!
//! Audio errors are answered with empty bodies. Chat errors are answered with
//! an assistant-shaped JSON body so the browser client can render them inline.

use crate::relay::{RelayError, upstream_busy_reply};
use axum::Json;
use axum::http::StatusCode;
use axum::http::header::{ACCEPT_RANGES, CONTENT_RANGE};
use axum::response::{IntoResponse, Response};
use huzi_core::ChatReply;
use huzi_core::range::unsatisfied_content_range;
use huzi_storage::StorageError;

/// Generic reply for internal faults. Carries no internal detail.
pub const INTERNAL_FAULT_REPLY: &str = "(the server stumbled, please try again later)";

/// Reply for chat bodies that are not valid JSON.
pub const BAD_REQUEST_REPLY: &str = "(I couldn't read that message, please try again)";

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("range not satisfiable for a {total}-byte resource")]
    RangeNotSatisfiable { total: u64 },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("upstream failure: {0}")]
    Upstream(#[from] RelayError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            Self::Storage(StorageError::NotFound(_)) => "not_found",
            Self::Storage(_) => "storage_error",
            Self::BadRequest(_) => "bad_request",
            Self::Upstream(RelayError::Timeout(_)) => "upstream_timeout",
            Self::Upstream(_) => "upstream_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "Request rejected");
        }

        match self {
            Self::RangeNotSatisfiable { total } => (
                status,
                [
                    (CONTENT_RANGE, unsatisfied_content_range(total)),
                    (ACCEPT_RANGES, "bytes".to_string()),
                ],
            )
                .into_response(),
            Self::Storage(_) => status.into_response(),
            Self::BadRequest(_) => {
                (status, Json(ChatReply::assistant(BAD_REQUEST_REPLY))).into_response()
            }
            Self::Upstream(e) => (
                status,
                Json(ChatReply::assistant(upstream_busy_reply(&e.detail()))),
            )
                .into_response(),
            Self::Internal(_) => {
                (status, Json(ChatReply::assistant(INTERNAL_FAULT_REPLY))).into_response()
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
