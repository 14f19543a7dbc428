use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use crate::services::AuthError;

/// Terminal failures at the web boundary. Validation-class problems never
/// become a `WebError`; handlers turn those into a flash message and a
/// redirect before any state is touched.
#[derive(Debug)]
pub enum WebError {
    /// CSRF mismatch, missing role, or an invalid recovery token.
    Forbidden,

    NotFound,

    InternalError(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forbidden => write!(f, "403 Forbidden"),
            Self::NotFound => write!(f, "404 Not Found"),
            Self::InternalError(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for WebError {}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            Self::Forbidden => (StatusCode::FORBIDDEN, "403 Forbidden").into_response(),
            Self::NotFound => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error. This event has been logged.",
                )
                    .into_response()
            }
        }
    }
}

impl From<anyhow::Error> for WebError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl From<AuthError> for WebError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken => Self::Forbidden,
            other => Self::InternalError(other.to_string()),
        }
    }
}

impl WebError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}
