use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use reprocess_core::distribution::Distributor;
use reprocess_core::finalizer::{notifier_for, Finalizer, LocalInputCache};
use reprocess_core::process::{CommandRunner, TokioCommandRunner};
use reprocess_core::Component;
use reprocess_server::bootstrap::{self, CommonArgs, LogTarget};

/// Finalizer: input intake, stale-work reconciliation, order completion
/// and purge of expired products.
#[derive(Debug, Parser)]
#[command(name = "reprocess-finalize", version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Keep running every `finalizer.poll_interval_secs`
    #[arg(long)]
    watch: bool,
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
    let config = bootstrap::load(&cli.common, Component::Finalizer)?;
    let status = config.require_status()?;
    let distribution = config.require_distribution()?.clone();

    let service = bootstrap::status_client(status)?;
    let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner::new());
    let distributor = Distributor::from_config(distribution, runner)
        .context("Failed to set up distribution")?;
    let notifier = notifier_for(&config.finalizer, Duration::from_secs(status.timeout_secs))
        .context("Failed to set up notifier")?;
    let availability = Arc::new(LocalInputCache::new(config.finalizer.input_dir.clone()));

    let finalizer = Finalizer::new(service, availability, notifier, Arc::new(distributor));

    if cli.watch {
        let interval = Duration::from_secs(config.finalizer.poll_interval_secs);
        finalizer
            .run_loop(interval, bootstrap::shutdown_channel())
            .await;
        return Ok(());
    }

    let report = finalizer.run_cycle().await.context("Finalizer cycle failed")?;
    for (step, reason) in &report.failed_steps {
        warn!(step = %step, error = %reason, "Finalizer step failed");
    }
    info!(
        on_cache = report.intake.on_cache,
        on_order = report.intake.on_order,
        unavailable = report.intake.unavailable,
        reset = report.reset,
        stale_queued = report.stale_queued,
        completed_orders = report.completed_orders.len(),
        notified = report.notified,
        purged = report.purged,
        purge_failures = report.purge_failures,
        "Finalizer finished"
    );
    Ok(())
}
