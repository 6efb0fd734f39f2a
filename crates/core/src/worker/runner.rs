use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use super::science::{collect_output, plan, run_plan, ScienceContext};
use super::staging::stage_input;
use super::{WorkDir, WorkerError, WorkerResult};
use crate::config::WorkerConfig;
use crate::distribution::{Delivered, Distributor};
use crate::process::CommandRunner;
use crate::record::{RecordCodec, WorkRecord};
use crate::sensor::SceneId;
use crate::service::{with_service_retry, ServiceRetry, StatusConnector, StatusService};
use crate::status::{SceneCompletion, SceneRef, SceneStatus};

/// How one work record ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Product delivered and the completion recorded.
    Completed(WorkerResult),
    /// Input can never be processed; recorded as `unavailable`.
    Unavailable,
    /// Processing failed; recorded as `error` when the service allowed it.
    Failed(String),
    /// The record could not be decoded. No status was touched.
    Rejected(String),
    /// The status service could not be reached or refused `processing`.
    /// Nothing was processed.
    Aborted(String),
}

impl WorkerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkerOutcome::Completed(_))
    }
}

/// Counts over a stream of records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub completed: usize,
    pub unavailable: usize,
    pub failed: usize,
    pub rejected: usize,
    pub aborted: usize,
}

impl WorkerSummary {
    fn record(&mut self, outcome: &WorkerOutcome) {
        match outcome {
            WorkerOutcome::Completed(_) => self.completed += 1,
            WorkerOutcome::Unavailable => self.unavailable += 1,
            WorkerOutcome::Failed(_) => self.failed += 1,
            WorkerOutcome::Rejected(_) => self.rejected += 1,
            WorkerOutcome::Aborted(_) => self.aborted += 1,
        }
    }
}

/// Processes work records: one scene each, reported back to the status
/// service named in the record.
pub struct Worker {
    config: WorkerConfig,
    codec: RecordCodec,
    connector: Arc<dyn StatusConnector>,
    runner: Arc<dyn CommandRunner>,
    distributor: Arc<Distributor>,
    retry: ServiceRetry,
    location: String,
}

impl Worker {
    pub fn new(
        config: WorkerConfig,
        codec: RecordCodec,
        connector: Arc<dyn StatusConnector>,
        runner: Arc<dyn CommandRunner>,
        distributor: Arc<Distributor>,
    ) -> Self {
        Self {
            config,
            codec,
            connector,
            runner,
            distributor,
            retry: ServiceRetry::once(),
            location: crate::process::hostname(),
        }
    }

    pub fn with_retry(mut self, retry: ServiceRetry) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Read records line by line from `input` and write one result line to
    /// `output` for every completed scene.
    pub async fn run_stream<R, W>(&self, input: R, mut output: W) -> std::io::Result<WorkerSummary>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut summary = WorkerSummary::default();
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let outcome = self.process_line(&line).await;
            if let WorkerOutcome::Completed(result) = &outcome {
                let text = result.to_line().map_err(std::io::Error::other)?;
                output.write_all(text.as_bytes()).await?;
                output.write_all(b"\n").await?;
                output.flush().await?;
            }
            summary.record(&outcome);
        }
        Ok(summary)
    }

    /// Process a single padded record line.
    pub async fn process_line(&self, line: &str) -> WorkerOutcome {
        let record = match self.codec.decode(line) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Skipping invalid work record");
                return WorkerOutcome::Rejected(e.to_string());
            }
        };
        let scene_id = match SceneId::parse(&record.scene) {
            Ok(scene_id) => scene_id,
            Err(e) => {
                warn!(order_id = %record.order_id, scene = %record.scene, error = %e, "Skipping record with invalid scene id");
                return WorkerOutcome::Rejected(e.to_string());
            }
        };
        let service = match self.connector.connect(&record.callback_address) {
            Ok(service) => service,
            Err(e) => {
                error!(order_id = %record.order_id, scene_id = %scene_id, error = %e, "Cannot reach status service");
                return WorkerOutcome::Aborted(e.to_string());
            }
        };
        let scene = SceneRef::new(&record.order_id, &record.scene);

        if let Err(e) = self.mark_processing(service.as_ref(), &scene).await {
            error!(order_id = %scene.order_id, scene_id = %scene.scene_id, error = %e, "Could not record processing; not processing scene");
            return WorkerOutcome::Aborted(e.to_string());
        }
        info!(order_id = %scene.order_id, scene_id = %scene.scene_id, location = %self.location, "Processing scene");

        let pipeline = AssertUnwindSafe(self.run_pipeline(&record, &scene_id)).catch_unwind();
        let result = match pipeline.await {
            Ok(result) => result,
            Err(panic) => Err(WorkerError::Panicked(panic_message(panic.as_ref()))),
        };

        match result {
            Ok(delivered) => self.report_complete(service.as_ref(), &scene, delivered).await,
            Err(e) if e.is_unavailable() => {
                self.report_unavailable(service.as_ref(), &scene, &e).await
            }
            Err(e) => self.report_error(service.as_ref(), &scene, &e).await,
        }
    }

    /// The `processing` report is retried both while the service is down and
    /// while it refuses the edge, since the dispatcher may not have marked
    /// the scene `queued` yet.
    async fn mark_processing(
        &self,
        service: &dyn StatusService,
        scene: &SceneRef,
    ) -> Result<(), WorkerError> {
        for attempt in 1..=self.retry.attempts {
            let accepted = with_service_retry(self.retry, "update_status", || {
                service.update_status(scene, &self.location, SceneStatus::Processing)
            })
            .await?;
            if accepted {
                return Ok(());
            }
            debug!(scene = %scene, attempt, "Processing refused, waiting for queued status");
            if attempt < self.retry.attempts {
                tokio::time::sleep(self.retry.sleep).await;
            }
        }
        Err(WorkerError::NotProcessing {
            scene: scene.to_string(),
        })
    }

    async fn run_pipeline(
        &self,
        record: &WorkRecord,
        scene_id: &SceneId,
    ) -> Result<Delivered, WorkerError> {
        record.options.validate_for(scene_id.sensor())?;

        let started = Utc::now();
        let timeout = Duration::from_secs(self.config.command_timeout_secs);
        let dir = WorkDir::create(
            &self.config.work_dir,
            &record.order_id,
            &record.scene,
            self.config.keep_work_dir,
        )
        .await?;

        let staged = stage_input(
            self.runner.as_ref(),
            &self.config.input_dir,
            scene_id,
            &dir,
            timeout,
        )
        .await?;

        let ctx = ScienceContext {
            work_dir: dir.work(),
            ancillary_path: self.config.ancillary_path.clone(),
            timeout,
        };
        let steps = plan(&staged, &record.options, &ctx);
        run_plan(self.runner.as_ref(), &steps, &record.scene).await?;

        let moved = collect_output(&dir.work(), &dir.output()).await?;
        debug!(scene_id = %scene_id, files = moved, "Collected output");

        let product_name = scene_id.product_name(started);
        let delivered = self
            .distributor
            .distribute(&record.order_id, &product_name, &dir.output(), &dir.stage())
            .await?;
        Ok(delivered)
    }

    async fn report_complete(
        &self,
        service: &dyn StatusService,
        scene: &SceneRef,
        delivered: Delivered,
    ) -> WorkerOutcome {
        let completion = SceneCompletion {
            order_id: scene.order_id.clone(),
            scene_id: scene.scene_id.clone(),
            location: self.location.clone(),
            product_location: delivered.product_location.clone(),
            checksum_location: delivered.checksum_location.clone(),
            log: None,
        };
        let recorded = with_service_retry(self.retry, "mark_scene_complete", || {
            service.mark_scene_complete(&completion)
        })
        .await;

        match recorded {
            Ok(true) => {
                info!(order_id = %scene.order_id, scene_id = %scene.scene_id, product = %delivered.product_location, "Scene complete");
                WorkerOutcome::Completed(WorkerResult {
                    order_id: completion.order_id,
                    scene_id: completion.scene_id,
                    product_location: completion.product_location,
                    checksum_location: completion.checksum_location,
                })
            }
            Ok(false) => {
                let message = format!("status service refused completion of {}", scene);
                error!(order_id = %scene.order_id, scene_id = %scene.scene_id, "Completion refused");
                WorkerOutcome::Failed(message)
            }
            Err(e) => {
                error!(order_id = %scene.order_id, scene_id = %scene.scene_id, error = %e, "Could not record completion");
                WorkerOutcome::Failed(e.to_string())
            }
        }
    }

    async fn report_unavailable(
        &self,
        service: &dyn StatusService,
        scene: &SceneRef,
        err: &WorkerError,
    ) -> WorkerOutcome {
        let log = err.diagnostic();
        warn!(order_id = %scene.order_id, scene_id = %scene.scene_id, error = %err, "Scene input unavailable");
        let recorded = with_service_retry(self.retry, "set_scene_unavailable", || {
            service.set_scene_unavailable(scene, &self.location, &log, Some("input not found"))
        })
        .await;
        match recorded {
            Ok(true) => WorkerOutcome::Unavailable,
            Ok(false) => WorkerOutcome::Failed(format!("status service refused unavailable for {}", scene)),
            Err(e) => {
                error!(order_id = %scene.order_id, scene_id = %scene.scene_id, error = %e, "Could not record unavailable");
                WorkerOutcome::Failed(e.to_string())
            }
        }
    }

    async fn report_error(
        &self,
        service: &dyn StatusService,
        scene: &SceneRef,
        err: &WorkerError,
    ) -> WorkerOutcome {
        let log = err.diagnostic();
        error!(order_id = %scene.order_id, scene_id = %scene.scene_id, error = %err, "Scene failed");
        let recorded = with_service_retry(self.retry, "set_scene_error", || {
            service.set_scene_error(scene, &self.location, &log)
        })
        .await;
        match recorded {
            Ok(true) => {}
            Ok(false) => warn!(scene = %scene, "Status service refused error status"),
            Err(e) => error!(scene = %scene, error = %e, "Could not record scene error"),
        }
        WorkerOutcome::Failed(err.to_string())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    }
}
