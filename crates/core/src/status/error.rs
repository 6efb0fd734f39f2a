use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors from the status store.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// The backing database could not be reached or is locked.
    #[error("status store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(String),
}

impl StatusError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StatusError::Unavailable(_))
    }
}

/// Classify a SQLite failure. Busy/locked/unopenable databases are transient.
pub(crate) fn db_err(e: rusqlite::Error) -> StatusError {
    match &e {
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(
                failure.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
            ) =>
        {
            StatusError::Unavailable(e.to_string())
        }
        _ => StatusError::Database(e.to_string()),
    }
}
