//! Bridge error types with HTTP status code mapping.
//!
//! [`BridgeError`] is the central error type for the bridge. Each variant
//! maps to a specific HTTP status code and structured JSON error response,
//! which is what the health/admin surface and the WebSocket upgrade
//! rejection return.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::DeviceId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "invalid argument: device id must not be empty",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category     | HTTP Status                 |
/// |-----------|--------------|-----------------------------|
/// | 1000–1999 | Validation   | 400 Bad Request / 422       |
/// | 2000–2999 | Session      | 404 Not Found / 409 Conflict|
/// | 3000–3999 | Server       | 500 Internal Server Error   |
/// | 5000–5999 | State store  | 502 Bad Gateway             |
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Out-of-range color or duration input, or an empty device identifier.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Frame has the wrong length, an unknown opcode, or out-of-range fields.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Write attempted on a session whose transport is already closed.
    #[error("transport closed for device {0}")]
    TransportClosed(DeviceId),

    /// No active session, or no stored state, under the identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// The state store did not confirm unregistration of a listener.
    #[error("failed to detach subscription on {path}: {reason}")]
    SubscriptionDetachFailure {
        /// Store path the listener was registered on.
        path: String,
        /// Why the detach did not complete.
        reason: String,
    },

    /// The external state store rejected or failed an operation.
    #[error("state store error: {0}")]
    Store(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidArgument(_) => 1001,
            Self::MalformedFrame(_) => 1002,
            Self::NotFound(_) => 2001,
            Self::TransportClosed(_) => 2002,
            Self::Internal(_) => 3000,
            Self::SubscriptionDetachFailure { .. } => 3001,
            Self::Store(_) => 5001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::MalformedFrame(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::TransportClosed(_) => StatusCode::CONFLICT,
            Self::SubscriptionDetachFailure { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Store(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
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
