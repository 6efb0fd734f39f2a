use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info};

use reprocess_core::distribution::Distributor;
use reprocess_core::process::{CommandRunner, TokioCommandRunner};
use reprocess_core::service::{HttpStatusConnector, ServiceRetry};
use reprocess_core::worker::Worker;
use reprocess_core::{Component, RecordCodec};
use reprocess_server::bootstrap::{self, CommonArgs, LogTarget};

const DEFAULT_STATUS_TIMEOUT_SECS: u64 = 30;

/// Worker: processes the work records on stdin, one scene per line, and
/// prints one result line per completed scene on stdout.
#[derive(Debug, Parser)]
#[command(name = "reprocess-worker", version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    bootstrap::init_logging(cli.common.log_format(), LogTarget::Stderr, "info");

    if let Err(e) = run(cli).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = bootstrap::load(&cli.common, Component::Worker)?;
    let worker_config = config.require_worker()?.clone();
    let distribution = config.require_distribution()?.clone();

    // The status endpoint comes from each record; [status] only tunes the client.
    let (timeout, retry) = match &config.status {
        Some(status) => (
            Duration::from_secs(status.timeout_secs),
            ServiceRetry::from_config(status),
        ),
        None => (
            Duration::from_secs(DEFAULT_STATUS_TIMEOUT_SECS),
            ServiceRetry::once(),
        ),
    };

    let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner::new());
    let distributor = Distributor::from_config(distribution, runner.clone())
        .context("Failed to set up distribution")?;
    let codec = RecordCodec::new(config.record.block_size).context("Invalid record block size")?;

    let worker = Worker::new(
        worker_config,
        codec,
        Arc::new(HttpStatusConnector::new(timeout)),
        runner,
        Arc::new(distributor),
    )
    .with_retry(retry);

    let summary = worker
        .run_stream(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
        .context("Failed to stream work records")?;
    info!(
        completed = summary.completed,
        unavailable = summary.unavailable,
        failed = summary.failed,
        rejected = summary.rejected,
        aborted = summary.aborted,
        "Worker finished"
    );
    Ok(())
}
