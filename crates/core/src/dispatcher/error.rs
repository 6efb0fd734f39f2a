use std::path::PathBuf;

use thiserror::Error;

use crate::process::CommandError;
use crate::record::RecordError;
use crate::service::ServiceError;

/// Errors from a batch substrate.
#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("substrate misconfigured: {0}")]
    Config(String),
}

impl SubstrateError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        SubstrateError::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Status(#[from] ServiceError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("failed to write batch file {path}: {source}")]
    BatchFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Submission failed; no scene was marked queued.
    #[error("job {job_name} submission failed: {source}")]
    Submission {
        job_name: String,
        #[source]
        source: SubstrateError,
    },
}
