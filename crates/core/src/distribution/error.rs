use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::process::CommandError;

/// A retried stage of distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Packaging,
    Delivery,
    Distribution,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Packaging => "packaging",
            Phase::Delivery => "delivery",
            Phase::Distribution => "distribution",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("output directory {0} is missing or empty")]
    MissingOutput(PathBuf),

    #[error("checksum mismatch for {location}: expected {expected}, found {actual}")]
    ChecksumMismatch {
        location: String,
        expected: String,
        actual: String,
    },

    #[error("transport failed: {0}")]
    Transport(String),

    #[error("{phase} failed after {attempts} attempt(s): {last}")]
    Exhausted {
        phase: Phase,
        attempts: u32,
        #[source]
        last: Box<DistributionError>,
    },
}

impl DistributionError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        DistributionError::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DistributionError::Command(e) => e.is_retryable(),
            DistributionError::Io { .. } => true,
            DistributionError::MissingOutput(_) => false,
            DistributionError::ChecksumMismatch { .. } => true,
            DistributionError::Transport(_) => true,
            DistributionError::Exhausted { last, .. } => last.is_retryable(),
        }
    }
}
