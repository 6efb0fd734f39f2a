use thiserror::Error;

use crate::status::StatusError;

/// Errors from Status Service operations, local or remote.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service could not be reached, timed out or reported itself busy.
    #[error("status service unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The service understood the request and refused it.
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("status service error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Unavailable(_))
    }
}

impl From<StatusError> for ServiceError {
    fn from(err: StatusError) -> Self {
        match err {
            StatusError::NotFound(msg) => ServiceError::NotFound(msg),
            StatusError::InvalidOrder(msg) => ServiceError::Rejected(msg),
            StatusError::Unavailable(msg) => ServiceError::Unavailable(msg),
            StatusError::Database(msg) => ServiceError::Internal(msg),
        }
    }
}
