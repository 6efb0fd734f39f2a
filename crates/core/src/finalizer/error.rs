use thiserror::Error;

use crate::distribution::DistributionError;
use crate::service::ServiceError;

/// Errors from sending a completion notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification request failed: {0}")]
    Http(String),

    #[error("Notification endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl NotifyError {
    pub fn is_retryable(&self) -> bool {
        match self {
            NotifyError::Http(_) => true,
            NotifyError::Rejected { status, .. } => *status >= 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error(transparent)]
    Status(#[from] ServiceError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error("Input cache check failed: {0}")]
    Input(String),
}

impl FinalizeError {
    /// Only an unreachable status service stops a cycle; every other
    /// failure is confined to its step.
    pub fn aborts_cycle(&self) -> bool {
        matches!(self, FinalizeError::Status(ServiceError::Unavailable(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aborts_cycle_only_when_unavailable() {
        assert!(FinalizeError::Status(ServiceError::Unavailable("down".into())).aborts_cycle());
        assert!(!FinalizeError::Status(ServiceError::NotFound("o1".into())).aborts_cycle());
        assert!(!FinalizeError::Input("no cache".into()).aborts_cycle());
    }

    #[test]
    fn test_notify_retryable() {
        assert!(NotifyError::Http("reset".into()).is_retryable());
        assert!(NotifyError::Rejected { status: 502, body: String::new() }.is_retryable());
        assert!(!NotifyError::Rejected { status: 400, body: String::new() }.is_retryable());
    }
}
