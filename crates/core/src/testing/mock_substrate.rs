//! Mock batch substrate for testing.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};

use super::{read, write};
use crate::dispatcher::{BatchJob, BatchSubstrate, JobOutcome, SubmittedJob, SubstrateError};

/// A submitted job and the record lines its batch file held.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub job: BatchJob,
    pub records: Vec<String>,
}

/// Mock implementation of the BatchSubstrate trait.
///
/// Submissions read the batch file (so tests can hand the records to a
/// worker) and finish immediately with the configured outcome.
#[derive(Debug)]
pub struct MockSubstrate {
    submitted: Arc<RwLock<Vec<RecordedSubmission>>>,
    cleaned_up: Arc<RwLock<Vec<String>>>,
    next_error: Arc<RwLock<Option<String>>>,
    outcome: Arc<RwLock<JobOutcome>>,
}

impl Default for MockSubstrate {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSubstrate {
    pub fn new() -> Self {
        Self {
            submitted: Arc::new(RwLock::new(Vec::new())),
            cleaned_up: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            outcome: Arc::new(RwLock::new(JobOutcome::Succeeded)),
        }
    }

    /// Make the next submission fail with `message`.
    pub fn fail_next_submit(&self, message: &str) {
        *write(&self.next_error) = Some(message.to_string());
    }

    /// Outcome reported by jobs submitted from now on.
    pub fn set_outcome(&self, outcome: JobOutcome) {
        *write(&self.outcome) = outcome;
    }

    /// Successful submissions, in order.
    pub fn submitted(&self) -> Vec<RecordedSubmission> {
        read(&self.submitted).clone()
    }

    /// Names of jobs cleaned up, in order.
    pub fn cleaned_up(&self) -> Vec<String> {
        read(&self.cleaned_up).clone()
    }
}

#[async_trait]
impl BatchSubstrate for MockSubstrate {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn submit(&self, job: &BatchJob) -> Result<SubmittedJob, SubstrateError> {
        if let Some(message) = write(&self.next_error).take() {
            return Err(SubstrateError::io(
                format!("submitting {}", job.name),
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, message),
            ));
        }

        let contents = tokio::fs::read_to_string(&job.batch_file)
            .await
            .map_err(|e| SubstrateError::io(format!("reading {}", job.batch_file.display()), e))?;
        write(&self.submitted).push(RecordedSubmission {
            job: job.clone(),
            records: contents.lines().map(|l| l.to_string()).collect(),
        });
        Ok(SubmittedJob::finished(read(&self.outcome).clone()))
    }

    async fn cleanup(&self, job: &BatchJob) -> Result<(), SubstrateError> {
        write(&self.cleaned_up).push(job.name.clone());
        Ok(())
    }
}
