//! Storage error types for fnterm-storage.
//!
//! [`StoreError`] carries the operator-facing message for every failure mode
//! of the file store and the database engine. The server maps each variant to
//! exactly one HTTP status.

use thiserror::Error;

/// Errors produced by file store and database engine operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required name or field is missing or malformed.
    #[error("{0}")]
    BadRequest(String),

    /// The file, database, or configuration file does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The target name is already taken.
    #[error("{0}")]
    Conflict(String),

    /// The file name does not carry the required extension.
    #[error("{0}")]
    InvalidType(String),

    /// The filesystem refused a write to an existing file.
    #[error("{0}")]
    NotWritable(String),

    /// SQLite rejected a statement.
    #[error("{message}")]
    Engine {
        message: String,
        /// SQLite extended result code, when the failure came from SQLite.
        code: Option<String>,
    },

    /// The database file is locked by another connection; retrying may succeed.
    #[error("{message}")]
    Busy { message: String },

    /// Any other I/O failure.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Builds a mapper for `map_err` that wraps an I/O error with context.
    pub fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> StoreError {
        let context = context.into();
        move |source| StoreError::Io { context, source }
    }

    /// Whether the same request may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Busy { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                StoreError::Busy {
                    message: format!("Database is busy, retry the request: {}", err),
                }
            }
            rusqlite::Error::SqliteFailure(failure, _) => StoreError::Engine {
                message: err.to_string(),
                code: Some(failure.extended_code.to_string()),
            },
            _ => StoreError::Engine {
                message: err.to_string(),
                code: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: std::ffi::c_int, message: &str) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), Some(message.to_string()))
    }

    #[test]
    fn busy_and_locked_are_retryable() {
        let busy: StoreError = failure(rusqlite::ffi::SQLITE_BUSY, "database is locked").into();
        assert!(busy.is_retryable());
        let locked: StoreError = failure(rusqlite::ffi::SQLITE_LOCKED, "table is locked").into();
        assert!(locked.is_retryable());
    }

    #[test]
    fn engine_errors_carry_message_and_code() {
        let err: StoreError = failure(rusqlite::ffi::SQLITE_ERROR, "no such table: t").into();
        match err {
            StoreError::Engine { message, code } => {
                assert_eq!(message, "no such table: t");
                assert_eq!(code.as_deref(), Some("1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
