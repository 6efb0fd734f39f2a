//! The dispatch cycle.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::batch::{job_name, write_batch};
use super::{BatchSubstrate, DispatchError, JobOutcome};
use crate::config::DispatcherConfig;
use crate::record::RecordCodec;
use crate::service::{with_service_retry, ServiceRetry, StatusService};
use crate::status::SceneToProcess;

/// Steps of one dispatch cycle, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Polling,
    BuildingBatch,
    Submitting,
    MarkingQueued,
    Waiting,
    Cleanup,
}

impl fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DispatchPhase::Polling => "polling",
            DispatchPhase::BuildingBatch => "building_batch",
            DispatchPhase::Submitting => "submitting",
            DispatchPhase::MarkingQueued => "marking_queued",
            DispatchPhase::Waiting => "waiting",
            DispatchPhase::Cleanup => "cleanup",
        })
    }
}

/// Which scenes a cycle picks up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchMode {
    /// Scenes whose input is on cache.
    Process,
    /// Scenes in `error`, optionally for one order.
    Retry { order_id: Option<String> },
}

/// Summary of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub job_name: Option<String>,
    pub selected: usize,
    pub dispatched: usize,
    pub skipped: usize,
    pub queued: usize,
    pub outcome: Option<JobOutcome>,
}

/// Polls for work, builds a batch, submits it and marks its scenes queued.
pub struct Dispatcher {
    service: Arc<dyn StatusService>,
    substrate: Arc<dyn BatchSubstrate>,
    codec: RecordCodec,
    batch_dir: PathBuf,
    scene_limit: usize,
    callback_address: String,
    location: String,
    retry: ServiceRetry,
}

impl Dispatcher {
    pub fn new(
        service: Arc<dyn StatusService>,
        substrate: Arc<dyn BatchSubstrate>,
        config: &DispatcherConfig,
        codec: RecordCodec,
        callback_address: impl Into<String>,
    ) -> Self {
        Self {
            service,
            substrate,
            codec,
            batch_dir: config.batch_dir.clone(),
            scene_limit: config.scene_limit,
            callback_address: callback_address.into(),
            location: crate::process::hostname(),
            retry: ServiceRetry::once(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_retry(mut self, retry: ServiceRetry) -> Self {
        self.retry = retry;
        self
    }

    async fn poll(&self, mode: &DispatchMode) -> Result<Vec<SceneToProcess>, DispatchError> {
        let scenes = match mode {
            DispatchMode::Process => {
                with_service_retry(self.retry, "get_scenes_to_process", || {
                    self.service.get_scenes_to_process(self.scene_limit)
                })
                .await?
            }
            DispatchMode::Retry { order_id } => {
                let mut scenes = with_service_retry(self.retry, "get_scenes_to_retry", || {
                    self.service.get_scenes_to_retry(order_id.as_deref())
                })
                .await?;
                scenes.truncate(self.scene_limit);
                scenes
            }
        };
        Ok(scenes)
    }

    /// Run one cycle. Submission failures abort the cycle with nothing
    /// marked queued; the same scenes are picked up next time.
    pub async fn run_cycle(&self, mode: &DispatchMode) -> Result<DispatchReport, DispatchError> {
        let mut report = DispatchReport::default();

        debug!(phase = %DispatchPhase::Polling, mode = ?mode, "Dispatch cycle started");
        let scenes = self.poll(mode).await?;
        report.selected = scenes.len();
        if scenes.is_empty() {
            debug!("No scenes to dispatch");
            return Ok(report);
        }

        let name = job_name(Utc::now(), std::process::id());
        report.job_name = Some(name.clone());
        debug!(phase = %DispatchPhase::BuildingBatch, job_name = %name, scenes = scenes.len());
        let batch = write_batch(
            &self.batch_dir,
            &name,
            &scenes,
            &self.codec,
            &self.callback_address,
        )
        .await?;
        report.skipped = batch.skipped.len();
        report.dispatched = batch.scenes.len();

        if batch.scenes.is_empty() {
            warn!(job_name = %name, "No encodable scenes; nothing submitted");
            self.remove_batch_file(&batch.job.batch_file).await;
            return Ok(report);
        }

        info!(
            phase = %DispatchPhase::Submitting,
            job_name = %name,
            substrate = self.substrate.name(),
            records = batch.job.record_count,
            "Submitting batch"
        );
        let submitted = match self.substrate.submit(&batch.job).await {
            Ok(submitted) => submitted,
            Err(e) => {
                error!(job_name = %name, error = %e, "Batch submission failed; no scenes queued");
                self.cleanup(&batch.job).await;
                return Err(DispatchError::Submission {
                    job_name: name,
                    source: e,
                });
            }
        };

        debug!(phase = %DispatchPhase::MarkingQueued, job_name = %name);
        let queued = with_service_retry(self.retry, "queue_scenes", || {
            self.service
                .queue_scenes(&batch.scenes, &self.location, &name)
        })
        .await;
        let queue_error = match queued {
            Ok(count) => {
                report.queued = count;
                if count < batch.scenes.len() {
                    warn!(job_name = %name, queued = count, dispatched = batch.scenes.len(), "Some dispatched scenes were not queued");
                }
                None
            }
            Err(e) => {
                error!(job_name = %name, error = %e, "Failed to mark scenes queued; they stay eligible");
                Some(e)
            }
        };

        info!(phase = %DispatchPhase::Waiting, job_name = %name, "Waiting for job");
        let outcome = submitted.wait().await;
        match &outcome {
            JobOutcome::Succeeded => info!(job_name = %name, "Job finished"),
            other => warn!(job_name = %name, outcome = %other, "Job finished with failures"),
        }
        report.outcome = Some(outcome);

        self.cleanup(&batch.job).await;

        match queue_error {
            Some(e) => Err(e.into()),
            None => Ok(report),
        }
    }

    async fn cleanup(&self, job: &super::BatchJob) {
        debug!(phase = %DispatchPhase::Cleanup, job_name = %job.name);
        if let Err(e) = self.substrate.cleanup(job).await {
            warn!(job_name = %job.name, error = %e, "Substrate cleanup failed");
        }
        self.remove_batch_file(&job.batch_file).await;
    }

    async fn remove_batch_file(&self, path: &std::path::Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to remove batch file");
            }
        }
    }

    /// Run cycles every `interval` until `shutdown` fires. Failed cycles are
    /// logged and retried on the next tick.
    pub async fn run_loop(
        &self,
        mode: DispatchMode,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(interval_secs = interval.as_secs(), "Dispatcher started");
        loop {
            match self.run_cycle(&mode).await {
                Ok(report) if report.selected > 0 => {
                    info!(
                        job_name = report.job_name.as_deref().unwrap_or(""),
                        dispatched = report.dispatched,
                        queued = report.queued,
                        "Dispatch cycle complete"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Dispatch cycle failed"),
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Dispatcher shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{SceneRef, SceneStatus};
    use crate::testing::{fixtures, MockSubstrate};
    use tempfile::TempDir;

    fn dispatcher(
        service: Arc<dyn StatusService>,
        substrate: Arc<MockSubstrate>,
        batch_dir: &TempDir,
    ) -> Dispatcher {
        let config = DispatcherConfig {
            batch_dir: batch_dir.path().to_path_buf(),
            scene_limit: 10,
            poll_interval_secs: 1,
        };
        Dispatcher::new(
            service,
            substrate,
            &config,
            RecordCodec::new(1024).unwrap(),
            "http://status:8080/api/v1",
        )
        .with_location("dispatch-host")
    }

    #[tokio::test]
    async fn test_cycle_queues_dispatched_scenes() {
        let service = fixtures::in_memory_service();
        let order = fixtures::order_on_cache(&service, &[fixtures::LANDSAT_SCENE, fixtures::MODIS_SCENE]).await;
        let substrate = Arc::new(MockSubstrate::new());
        let batch_dir = TempDir::new().unwrap();

        let report = dispatcher(service.clone(), substrate.clone(), &batch_dir)
            .run_cycle(&DispatchMode::Process)
            .await
            .unwrap();

        assert_eq!(report.selected, 2);
        assert_eq!(report.queued, 2);
        assert_eq!(report.outcome, Some(JobOutcome::Succeeded));

        let scene = service
            .get_order(&order.id)
            .await
            .unwrap()
            .unwrap()
            .scenes
            .remove(0);
        assert_eq!(scene.status, SceneStatus::Queued);
        assert_eq!(scene.processing_location.as_deref(), Some("dispatch-host"));
        assert_eq!(scene.job_name, report.job_name);

        let jobs = substrate.submitted();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job.record_count, 2);
        assert_eq!(jobs[0].records.len(), 2);
        assert_eq!(substrate.cleaned_up().len(), 1);
        // Local batch file removed after the run.
        assert_eq!(std::fs::read_dir(batch_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_submission_failure_queues_nothing() {
        let service = fixtures::in_memory_service();
        fixtures::order_on_cache(&service, &[fixtures::LANDSAT_SCENE]).await;
        let substrate = Arc::new(MockSubstrate::new());
        substrate.fail_next_submit("jobtracker unreachable");
        let batch_dir = TempDir::new().unwrap();
        let dispatcher = dispatcher(service.clone(), substrate.clone(), &batch_dir);

        let before = service.get_scenes_to_process(10).await.unwrap();
        let err = dispatcher.run_cycle(&DispatchMode::Process).await.unwrap_err();
        assert!(matches!(err, DispatchError::Submission { .. }));

        let after = service.get_scenes_to_process(10).await.unwrap();
        assert_eq!(before, after);
        assert_eq!(substrate.cleaned_up().len(), 1);
        assert_eq!(std::fs::read_dir(batch_dir.path()).unwrap().count(), 0);

        // Next cycle succeeds with the same scenes.
        let report = dispatcher.run_cycle(&DispatchMode::Process).await.unwrap();
        assert_eq!(report.queued, 1);
    }

    #[tokio::test]
    async fn test_empty_poll_submits_nothing() {
        let service = fixtures::in_memory_service();
        let substrate = Arc::new(MockSubstrate::new());
        let batch_dir = TempDir::new().unwrap();

        let report = dispatcher(service, substrate.clone(), &batch_dir)
            .run_cycle(&DispatchMode::Process)
            .await
            .unwrap();
        assert_eq!(report, DispatchReport::default());
        assert!(substrate.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_retry_mode_requeues_errored_scenes() {
        let service = fixtures::in_memory_service();
        let order = fixtures::order_on_cache(&service, &[fixtures::LANDSAT_SCENE]).await;
        let scene = SceneRef::new(&order.id, fixtures::LANDSAT_SCENE);
        service.queue_scenes(&[scene.clone()], "d", "j0").await.unwrap();
        service.update_status(&scene, "w", SceneStatus::Processing).await.unwrap();
        service.set_scene_error(&scene, "w", "ledaps failed").await.unwrap();

        let substrate = Arc::new(MockSubstrate::new());
        let batch_dir = TempDir::new().unwrap();
        let dispatcher = dispatcher(service.clone(), substrate, &batch_dir);

        let report = dispatcher
            .run_cycle(&DispatchMode::Retry { order_id: Some(order.id.clone()) })
            .await
            .unwrap();
        assert_eq!(report.queued, 1);
        assert!(service.get_scenes_to_retry(None).await.unwrap().is_empty());
    }
}
