//! Runs the worker on this host, one process per record.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{BatchJob, BatchSubstrate, JobOutcome, SubmittedJob, SubstrateError};
use crate::config::ClusterConfig;
use crate::process::{CommandRunner, CommandSpec};
use crate::worker::parse_result_line;

pub struct LocalSubstrate {
    config: ClusterConfig,
    runner: Arc<dyn CommandRunner>,
}

impl LocalSubstrate {
    pub fn new(config: ClusterConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }
}

#[async_trait]
impl BatchSubstrate for LocalSubstrate {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn submit(&self, job: &BatchJob) -> Result<SubmittedJob, SubstrateError> {
        let contents = tokio::fs::read_to_string(&job.batch_file)
            .await
            .map_err(|e| {
                SubstrateError::io(format!("failed to read {}", job.batch_file.display()), e)
            })?;
        let records: Vec<String> = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| format!("{}\n", line))
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel.max(1)));
        let runner = self.runner.clone();
        let mapper = self.config.mapper.clone();
        let job_name = job.name.clone();
        info!(job_name = %job_name, records = records.len(), "Launching local job");

        Ok(SubmittedJob::spawn(async move {
            let total = records.len();
            let mut tasks = JoinSet::new();
            for (index, record) in records.into_iter().enumerate() {
                let semaphore = semaphore.clone();
                let runner = runner.clone();
                let spec = CommandSpec::new(&mapper).stdin_bytes(record);
                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok()?;
                    let ok = match runner.run(&spec).await {
                        Ok(output) => output.success() && parse_result_line(&output.stdout).is_some(),
                        Err(e) => {
                            warn!(record = index, error = %e, "Mapper could not run");
                            false
                        }
                    };
                    Some(ok)
                });
            }

            let mut failed = 0;
            while let Some(joined) = tasks.join_next().await {
                if !matches!(joined, Ok(Some(true))) {
                    failed += 1;
                }
            }
            debug!(job_name = %job_name, total, failed, "Local job finished");

            match failed {
                0 => JobOutcome::Succeeded,
                n if n == total => JobOutcome::Failed(format!("all {} records failed", total)),
                n => JobOutcome::PartiallyFailed { failed: n, total },
            }
        }))
    }

    async fn cleanup(&self, _job: &BatchJob) -> Result<(), SubstrateError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use crate::testing::MockCommandRunner;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const OK_LINE: &str = r#"RESULT {"order_id":"o","scene_id":"s","product_location":"p","checksum_location":"c"}"#;

    fn write_batch(dir: &TempDir, lines: &[&str]) -> BatchJob {
        let path = dir.path().join("job.txt");
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();
        BatchJob {
            name: "job".to_string(),
            batch_file: path,
            record_count: lines.len(),
        }
    }

    fn config() -> ClusterConfig {
        ClusterConfig {
            mapper: PathBuf::from("reprocess-worker"),
            max_parallel: 2,
            ..ClusterConfig::default()
        }
    }

    fn success() -> CommandOutput {
        CommandOutput {
            exit_code: Some(0),
            stdout: format!("{}\n", OK_LINE),
            stderr: String::new(),
        }
    }

    #[tokio::test]
    async fn test_runs_mapper_per_record_with_stdin() {
        let dir = TempDir::new().unwrap();
        let job = write_batch(&dir, &["{\"a\":1}####", "{\"b\":2}####"]);
        let runner = Arc::new(MockCommandRunner::new());
        runner.set_default(success());

        let substrate = LocalSubstrate::new(config(), runner.clone());
        let outcome = substrate.submit(&job).await.unwrap().wait().await;
        assert_eq!(outcome, JobOutcome::Succeeded);

        let mut inputs: Vec<String> = runner
            .calls()
            .iter()
            .map(|c| String::from_utf8(c.stdin.clone().unwrap()).unwrap())
            .collect();
        inputs.sort();
        assert_eq!(inputs, vec!["{\"a\":1}####\n", "{\"b\":2}####\n"]);
    }

    #[tokio::test]
    async fn test_missing_result_line_counts_as_failure() {
        let dir = TempDir::new().unwrap();
        let job = write_batch(&dir, &["one", "two"]);
        let runner = Arc::new(MockCommandRunner::new());
        runner.push_output("reprocess-worker", success());
        runner.push_output(
            "reprocess-worker",
            CommandOutput {
                exit_code: Some(0),
                stdout: "no result\n".to_string(),
                stderr: String::new(),
            },
        );

        let substrate = LocalSubstrate::new(config(), runner);
        let outcome = substrate.submit(&job).await.unwrap().wait().await;
        assert_eq!(outcome, JobOutcome::PartiallyFailed { failed: 1, total: 2 });
    }

    #[tokio::test]
    async fn test_missing_batch_file_fails_submission() {
        let substrate = LocalSubstrate::new(config(), Arc::new(MockCommandRunner::new()));
        let job = BatchJob {
            name: "job".to_string(),
            batch_file: PathBuf::from("/nonexistent/job.txt"),
            record_count: 1,
        };
        assert!(substrate.submit(&job).await.is_err());
    }
}
