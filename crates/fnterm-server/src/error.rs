//! API error types with HTTP status code mapping.
//!
//! [`ApiError`] is the single error type of every handler. Each variant maps
//! to exactly one status code and always renders a JSON `{"error": ...}` body;
//! engine errors add `sqlstate` and busy errors add `retryable`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use fnterm_script::{InvokeError, LoadError};
use fnterm_storage::StoreError;

/// Body of every error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlstate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or malformed input (400).
    #[error("{0}")]
    BadRequest(String),

    /// No authenticated session while authentication is enabled (401).
    #[error("Authentication required.")]
    Unauthenticated,

    /// Unknown file, database, or function (404).
    #[error("{0}")]
    NotFound(String),

    /// The verb does not accept this HTTP method (405).
    #[error("Method Not Allowed.")]
    MethodNotAllowed,

    /// The target name is taken (409).
    #[error("{0}")]
    Conflict(String),

    /// Wrong file extension (400).
    #[error("{0}")]
    InvalidType(String),

    /// Wrong number of arguments for a function (400).
    #[error("{0}")]
    ArgumentMismatch(String),

    /// The filesystem refused the write (500).
    #[error("{0}")]
    NotWritable(String),

    /// SQLite rejected the statement (400).
    #[error("{message}")]
    Engine {
        message: String,
        code: Option<String>,
    },

    /// SQLite is locked by another connection (500, retryable).
    #[error("{0}")]
    EngineBusy(String),

    /// Anything else (500).
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::InvalidType(_) | ApiError::ArgumentMismatch(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Engine { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotWritable(_) | ApiError::EngineBusy(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{}", self);
        } else {
            tracing::debug!(status = status.as_u16(), "{}", self);
        }

        let body = ErrorBody {
            error: self.to_string(),
            sqlstate: match &self {
                ApiError::Engine { code, .. } => code.clone(),
                _ => None,
            },
            retryable: matches!(self, ApiError::EngineBusy(_)).then_some(true),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::BadRequest(msg) => ApiError::BadRequest(msg),
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::InvalidType(msg) => ApiError::InvalidType(msg),
            StoreError::NotWritable(msg) => ApiError::NotWritable(msg),
            StoreError::Engine { message, code } => ApiError::Engine { message, code },
            StoreError::Busy { message } => ApiError::EngineBusy(message),
            err @ StoreError::Io { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<InvokeError> for ApiError {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::NotFound(_) => ApiError::NotFound(err.to_string()),
            InvokeError::ArgumentMismatch { .. } => ApiError::ArgumentMismatch(err.to_string()),
            InvokeError::Runtime(runtime) => {
                ApiError::Internal(format!("An internal server error occurred: {}", runtime))
            }
        }
    }
}

impl From<LoadError> for ApiError {
    fn from(err: LoadError) -> Self {
        ApiError::Internal(format!("An internal server error occurred: {}", err))
    }
}
