use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::SubstrateError;

/// A written batch file ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub name: String,
    pub batch_file: PathBuf,
    pub record_count: usize,
}

/// How a submitted job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    /// Some records failed; their scenes report their own status.
    PartiallyFailed { failed: usize, total: usize },
    Failed(String),
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Succeeded => f.write_str("succeeded"),
            JobOutcome::PartiallyFailed { failed, total } => {
                write!(f, "{} of {} records failed", failed, total)
            }
            JobOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Handle on a launched job.
pub struct SubmittedJob {
    handle: JoinHandle<JobOutcome>,
}

impl SubmittedJob {
    /// Drive `run` in the background.
    pub fn spawn<F>(run: F) -> Self
    where
        F: Future<Output = JobOutcome> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(run),
        }
    }

    /// A job that has already finished.
    pub fn finished(outcome: JobOutcome) -> Self {
        Self::spawn(async move { outcome })
    }

    pub async fn wait(self) -> JobOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => JobOutcome::Failed(format!("job task aborted: {}", e)),
        }
    }
}

/// Where batch jobs run.
#[async_trait]
pub trait BatchSubstrate: Send + Sync {
    fn name(&self) -> &'static str;

    /// Stage the batch file and launch the job. An error means nothing runs.
    async fn submit(&self, job: &BatchJob) -> Result<SubmittedJob, SubstrateError>;

    /// Remove whatever `submit` staged.
    async fn cleanup(&self, job: &BatchJob) -> Result<(), SubstrateError>;
}
