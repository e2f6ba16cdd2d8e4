//! HTTP error types for the `SecLab` server.
//!
//! Maps domain errors from `seclab-core` onto HTTP responses through their
//! [`ErrorKind`]. Every response carries a JSON body with a
//! machine-readable `error` field and a human-readable `message`. Messages
//! for authentication, availability and internal failures are fixed
//! strings; the underlying error is logged, never returned.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

use seclab_core::ErrorKind;
use seclab_core::error::{AuthError, ContentError};

/// Seconds a client should wait before retrying a 503.
const RETRY_AFTER_SECS: &str = "1";

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Missing, malformed, forged or expired credential; failed login.
    Unauthorized(&'static str),
    /// Valid credential, insufficient role.
    Forbidden(String),
    /// Requested resource absent or masked.
    NotFound(String),
    /// Client sent invalid input.
    BadRequest(String),
    /// A unique key is already taken, or children block a delete.
    Conflict(String),
    /// The store timed out or failed. Retryable.
    Unavailable,
    /// Internal server error.
    Internal,
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.to_owned()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            Self::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                "service temporarily unavailable, retry shortly".to_owned(),
            ),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal server error".to_owned(),
            ),
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        let mut response = (status, axum::Json(body)).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}

impl AppError {
    /// Build the response variant for `kind`, using `detail` only where it
    /// is safe to show.
    fn from_kind(kind: ErrorKind, detail: String) -> Self {
        match kind {
            ErrorKind::Conflict => Self::Conflict(detail),
            ErrorKind::Forbidden => Self::Forbidden(detail),
            ErrorKind::NotFound => Self::NotFound(detail),
            ErrorKind::Invalid => Self::BadRequest(detail),
            ErrorKind::Unauthorized => Self::Unauthorized("invalid or missing credentials"),
            ErrorKind::Unavailable => {
                warn!(error = %detail, "storage unavailable");
                Self::Unavailable
            }
            ErrorKind::Internal => {
                error!(error = %detail, "internal error");
                Self::Internal
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => Self::Unauthorized("authentication required"),
            AuthError::InvalidCredentials => Self::Unauthorized("invalid username or password"),
            AuthError::TokenMalformed { .. } | AuthError::TokenSignature | AuthError::TokenExpired { .. } => {
                warn!(error = %err, "token rejected");
                Self::Unauthorized("invalid or expired token")
            }
            other => Self::from_kind(other.kind(), other.to_string()),
        }
    }
}

impl From<ContentError> for AppError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::Auth(inner) => inner.into(),
            other => Self::from_kind(other.kind(), other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}
