use std::path::PathBuf;

use thiserror::Error;

use crate::distribution::DistributionError;
use crate::options::OptionsError;
use crate::process::{tail_lines, CommandError};
use crate::record::RecordError;
use crate::sensor::SensorError;
use crate::service::ServiceError;

/// Lines of command output kept in a scene's error log.
const OUTPUT_TAIL_LINES: usize = 20;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid work record: {0}")]
    Record(#[from] RecordError),

    #[error("Invalid scene id: {0}")]
    Scene(#[from] SensorError),

    #[error("Status service error: {0}")]
    Status(#[from] ServiceError),

    #[error("Status service did not accept {scene} as processing")]
    NotProcessing { scene: String },

    #[error("Input cache {0} does not exist")]
    InputRootMissing(PathBuf),

    #[error("Input for {scene} not found at {}", path.display())]
    InputMissing { scene: String, path: PathBuf },

    #[error("Staged input for {scene} has no {what}")]
    InputIncomplete { scene: String, what: &'static str },

    #[error("Unsupported options: {0}")]
    Options(#[from] OptionsError),

    #[error("Invalid work directory component: {0:?}")]
    InvalidPath(String),

    #[error("{step} step failed: {source}")]
    Science {
        step: &'static str,
        #[source]
        source: CommandError,
    },

    #[error("Staging failed: {0}")]
    Staging(#[source] CommandError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker panicked: {0}")]
    Panicked(String),
}

impl WorkerError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        WorkerError::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether the scene can never be processed from the current input.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, WorkerError::InputMissing { .. })
    }

    /// Text recorded as the scene's log: the error plus the tail of any
    /// command output.
    pub fn diagnostic(&self) -> String {
        let source = match self {
            WorkerError::Science { source, .. } | WorkerError::Staging(source) => Some(source),
            _ => None,
        };
        let mut text = self.to_string();
        if let Some(CommandError::Failed { stdout, stderr, .. }) = source {
            let stdout = tail_lines(stdout, OUTPUT_TAIL_LINES);
            let stderr = tail_lines(stderr, OUTPUT_TAIL_LINES);
            if !stdout.is_empty() {
                text.push_str("\n--- stdout ---\n");
                text.push_str(&stdout);
            }
            if !stderr.is_empty() {
                text.push_str("\n--- stderr ---\n");
                text.push_str(&stderr);
            }
        }
        text
    }
}
