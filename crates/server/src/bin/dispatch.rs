use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use reprocess_core::dispatcher::{substrate_for, DispatchMode, Dispatcher};
use reprocess_core::process::{CommandRunner, TokioCommandRunner};
use reprocess_core::service::ServiceRetry;
use reprocess_core::{Component, RecordCodec};
use reprocess_server::bootstrap::{self, CommonArgs, LogTarget};

/// Dispatcher: submits on-cache scenes to the batch substrate.
#[derive(Debug, Parser)]
#[command(name = "reprocess-dispatch", version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Keep polling every `dispatcher.poll_interval_secs`
    #[arg(long)]
    watch: bool,

    /// Re-dispatch scenes in `error` instead of new work
    #[arg(long)]
    retry: bool,

    /// Restrict `--retry` to one order
    #[arg(long, requires = "retry")]
    order: Option<String>,
}

impl Cli {
    fn mode(&self) -> DispatchMode {
        if self.retry {
            DispatchMode::Retry {
                order_id: self.order.clone(),
            }
        } else {
            DispatchMode::Process
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    bootstrap::init_logging(cli.common.log_format(), LogTarget::Stdout, "info");

    if let Err(e) = run(cli).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = bootstrap::load(&cli.common, Component::Dispatcher)?;
    let status = config.require_status()?;
    let cluster = config.require_cluster()?;

    let service = bootstrap::status_client(status)?;
    let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner::new());
    let substrate =
        substrate_for(cluster, runner).context("Failed to set up the batch substrate")?;
    let codec = RecordCodec::new(config.record.block_size).context("Invalid record block size")?;
    tokio::fs::create_dir_all(&config.dispatcher.batch_dir)
        .await
        .with_context(|| format!("Failed to create {:?}", config.dispatcher.batch_dir))?;

    let dispatcher = Dispatcher::new(
        service,
        substrate,
        &config.dispatcher,
        codec,
        status.url.clone(),
    )
    .with_retry(ServiceRetry::from_config(status));

    let mode = cli.mode();
    if cli.watch {
        let interval = Duration::from_secs(config.dispatcher.poll_interval_secs);
        dispatcher
            .run_loop(mode, interval, bootstrap::shutdown_channel())
            .await;
        return Ok(());
    }

    let report = dispatcher
        .run_cycle(&mode)
        .await
        .context("Dispatch cycle failed")?;
    info!(
        job_name = report.job_name.as_deref().unwrap_or(""),
        selected = report.selected,
        dispatched = report.dispatched,
        skipped = report.skipped,
        queued = report.queued,
        outcome = %report.outcome.as_ref().map(|o| o.to_string()).unwrap_or_else(|| "none".to_string()),
        "Dispatch finished"
    );
    Ok(())
}
