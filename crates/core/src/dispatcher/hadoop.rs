//! Hadoop streaming substrate.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{BatchJob, BatchSubstrate, JobOutcome, SubmittedJob, SubstrateError};
use crate::config::ClusterConfig;
use crate::process::{CommandRunner, CommandSpec};

/// Runs one map task per record with `hadoop jar <streaming jar>`.
pub struct HadoopStreaming {
    config: ClusterConfig,
    runner: Arc<dyn CommandRunner>,
}

impl HadoopStreaming {
    pub fn new(config: ClusterConfig, runner: Arc<dyn CommandRunner>) -> Result<Self, SubstrateError> {
        if config.streaming_jar.is_none() {
            return Err(SubstrateError::Config(
                "cluster.streaming_jar is required for the hadoop substrate".to_string(),
            ));
        }
        Ok(Self { config, runner })
    }

    /// HDFS path the batch file is copied to.
    pub fn target(&self, job: &BatchJob) -> String {
        format!(
            "{}/{}.txt",
            self.config.staging_dir.trim_end_matches('/'),
            job.name
        )
    }

    fn hadoop(&self) -> CommandSpec {
        let spec = CommandSpec::new(&self.config.hadoop_path);
        match &self.config.user {
            Some(user) => spec.env("HADOOP_USER_NAME", user),
            None => spec,
        }
    }

    pub fn stage_command(&self, job: &BatchJob) -> CommandSpec {
        self.hadoop()
            .args(["dfs", "-copyFromLocal"])
            .path_arg(&job.batch_file)
            .arg(self.target(job))
    }

    pub fn launch_command(&self, job: &BatchJob) -> CommandSpec {
        let target = self.target(job);
        let mut spec = self.hadoop().arg("jar");
        if let Some(jar) = &self.config.streaming_jar {
            spec = spec.path_arg(jar);
        }

        // Generic options must precede the streaming options.
        if let Some(name_node) = &self.config.name_node {
            spec = spec.args(["-fs", name_node.as_str()]);
        }
        if let Some(job_tracker) = &self.config.job_tracker {
            spec = spec.args(["-jt", job_tracker.as_str()]);
        }
        spec.args([
            "-D".to_string(),
            "mapred.reduce.tasks=0".to_string(),
            "-D".to_string(),
            format!("mapred.task.timeout={}", self.config.task_timeout_ms),
            "-D".to_string(),
            format!("mapred.job.queue.name={}", self.config.queue),
            "-D".to_string(),
            format!("mapred.job.name={}", job.name),
        ])
        .arg("-mapper")
        .path_arg(&self.config.mapper)
        .arg("-input")
        .arg(target.clone())
        .arg("-output")
        .arg(format!("{}-out", target))
    }

    pub fn cleanup_commands(&self, job: &BatchJob) -> Vec<CommandSpec> {
        let target = self.target(job);
        vec![
            self.hadoop().args(["dfs", "-rmr"]).arg(target.clone()),
            self.hadoop()
                .args(["dfs", "-rmr"])
                .arg(format!("{}-out", target)),
        ]
    }
}

#[async_trait]
impl BatchSubstrate for HadoopStreaming {
    fn name(&self) -> &'static str {
        "hadoop"
    }

    async fn submit(&self, job: &BatchJob) -> Result<SubmittedJob, SubstrateError> {
        self.runner
            .run(&self.stage_command(job))
            .await?
            .check("hadoop dfs -copyFromLocal")?;
        info!(job_name = %job.name, target = %self.target(job), "Staged batch file");

        let runner = self.runner.clone();
        let launch = self.launch_command(job);
        let job_name = job.name.clone();
        Ok(SubmittedJob::spawn(async move {
            match runner.run(&launch).await {
                Ok(output) if output.success() => JobOutcome::Succeeded,
                Ok(output) => {
                    warn!(job_name = %job_name, exit_code = ?output.exit_code, "Hadoop job failed");
                    JobOutcome::Failed(format!(
                        "hadoop jar exited with {:?}: {}",
                        output.exit_code,
                        crate::process::tail_lines(&output.stderr, 20)
                    ))
                }
                Err(e) => JobOutcome::Failed(e.to_string()),
            }
        }))
    }

    async fn cleanup(&self, job: &BatchJob) -> Result<(), SubstrateError> {
        let mut first_error = None;
        for spec in self.cleanup_commands(job) {
            let result = match self.runner.run(&spec).await {
                Ok(output) => output.check("hadoop dfs -rmr").map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(job_name = %job.name, command = %spec, error = %e, "Cleanup command failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
