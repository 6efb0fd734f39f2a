use thiserror::Error;

/// Errors from running an external command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The executable could not be found.
    #[error("Command not found: {program}")]
    NotFound { program: String },

    /// The command ran and exited unsuccessfully.
    #[error("{program} exited with {}", describe_exit(.exit_code))]
    Failed {
        program: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// The command exceeded its timeout and was killed.
    #[error("{program} timed out after {timeout_secs} seconds")]
    Timeout { program: String, timeout_secs: u64 },

    /// I/O error while spawning or talking to the process.
    #[error("I/O error running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}

impl CommandError {
    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Failed { .. } | Self::Timeout { .. } | Self::Io { .. }
        )
    }

    /// Captured stderr, if the command got far enough to produce any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Failed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}
