use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::{Availability, FinalizeError, InputAvailability, Notifier};
use crate::distribution::Distributor;
use crate::sensor::SceneId;
use crate::service::StatusService;
use crate::status::{Scene, SceneStatus};

/// Scenes read per intake page.
const INTAKE_PAGE: usize = 1000;

/// Steps of one finalizer cycle, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeStep {
    Intake,
    Reconcile,
    Finalize,
    Purge,
}

impl fmt::Display for FinalizeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FinalizeStep::Intake => "intake",
            FinalizeStep::Reconcile => "reconcile",
            FinalizeStep::Finalize => "finalize",
            FinalizeStep::Purge => "purge",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeReport {
    pub on_cache: usize,
    pub on_order: usize,
    pub unavailable: usize,
    /// Scenes whose id does not parse; left where they are.
    pub skipped: usize,
}

/// Summary of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeReport {
    pub intake: IntakeReport,
    pub reset: usize,
    pub stale_queued: i64,
    pub completed_orders: Vec<String>,
    pub notified: usize,
    pub purged: usize,
    pub purge_failures: usize,
    /// Steps that failed without aborting the cycle.
    pub failed_steps: Vec<(FinalizeStep, String)>,
}

/// Moves new scenes onto the cache, resets stale work, completes and
/// announces finished orders, and purges expired products.
pub struct Finalizer {
    service: Arc<dyn StatusService>,
    availability: Arc<dyn InputAvailability>,
    notifier: Arc<dyn Notifier>,
    distributor: Arc<Distributor>,
    location: String,
}

impl Finalizer {
    pub fn new(
        service: Arc<dyn StatusService>,
        availability: Arc<dyn InputAvailability>,
        notifier: Arc<dyn Notifier>,
        distributor: Arc<Distributor>,
    ) -> Self {
        Self {
            service,
            availability,
            notifier,
            distributor,
            location: crate::process::hostname(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Run all four steps. A failing step is logged and recorded in the
    /// report; only an unreachable status service aborts the cycle.
    pub async fn run_cycle(&self) -> Result<FinalizeReport, FinalizeError> {
        let mut report = FinalizeReport::default();

        match self.intake().await {
            Ok(intake) => report.intake = intake,
            Err(e) => self.step_failed(&mut report, FinalizeStep::Intake, e)?,
        }

        match self.service.reconcile_stale_scenes().await {
            Ok(reconciled) => {
                report.reset = reconciled.reset.len();
                report.stale_queued = reconciled.stale_queued;
                for scene in &reconciled.reset {
                    warn!(order_id = %scene.order_id, scene_id = %scene.scene_id, "Stale processing scene moved to error");
                }
                if reconciled.stale_queued > 0 {
                    warn!(count = reconciled.stale_queued, "Scenes queued with no worker activity");
                }
            }
            Err(e) => self.step_failed(&mut report, FinalizeStep::Reconcile, e.into())?,
        }

        if let Err(e) = self.finalize_orders(&mut report).await {
            self.step_failed(&mut report, FinalizeStep::Finalize, e)?;
        }

        if let Err(e) = self.purge(&mut report).await {
            self.step_failed(&mut report, FinalizeStep::Purge, e)?;
        }

        Ok(report)
    }

    fn step_failed(
        &self,
        report: &mut FinalizeReport,
        step: FinalizeStep,
        err: FinalizeError,
    ) -> Result<(), FinalizeError> {
        if err.aborts_cycle() {
            error!(step = %step, error = %err, "Status service unavailable; finalizer cycle aborted");
            return Err(err);
        }
        error!(step = %step, error = %err, "Finalizer step failed");
        report.failed_steps.push((step, err.to_string()));
        Ok(())
    }

    async fn intake(&self) -> Result<IntakeReport, FinalizeError> {
        let mut report = IntakeReport::default();
        for status in [SceneStatus::Submitted, SceneStatus::OnOrder] {
            // Scenes that leave `status` shift later rows forward, so the
            // offset only advances past scenes that stayed.
            let mut offset = 0;
            loop {
                let scenes = self.service.list_scenes(status, INTAKE_PAGE, offset).await?;
                let page_len = scenes.len();
                for scene in scenes {
                    if !self.intake_scene(status, &scene, &mut report).await? {
                        offset += 1;
                    }
                }
                if page_len < INTAKE_PAGE {
                    break;
                }
            }
        }
        if report != IntakeReport::default() {
            info!(
                on_cache = report.on_cache,
                on_order = report.on_order,
                unavailable = report.unavailable,
                skipped = report.skipped,
                "Intake complete"
            );
        }
        Ok(report)
    }

    /// Move one scene according to its input availability. Returns whether
    /// the scene left `status`.
    async fn intake_scene(
        &self,
        status: SceneStatus,
        scene: &Scene,
        report: &mut IntakeReport,
    ) -> Result<bool, FinalizeError> {
        let scene_ref = scene.scene_ref();
        let scene_id = match SceneId::parse(&scene.scene_id) {
            Ok(id) => id,
            Err(e) => {
                warn!(order_id = %scene.order_id, scene_id = %scene.scene_id, error = %e, "Unrecognized scene id left for manual review");
                report.skipped += 1;
                return Ok(false);
            }
        };

        let moved = match self.availability.check(&scene_id).await? {
            Availability::OnCache => {
                let moved = self
                    .service
                    .update_status(&scene_ref, &self.location, SceneStatus::OnCache)
                    .await?;
                if moved {
                    report.on_cache += 1;
                }
                moved
            }
            Availability::Orderable if status == SceneStatus::Submitted => {
                let moved = self
                    .service
                    .update_status(&scene_ref, &self.location, SceneStatus::OnOrder)
                    .await?;
                if moved {
                    report.on_order += 1;
                }
                moved
            }
            Availability::Orderable => false,
            Availability::Unavailable => {
                let log = format!(
                    "input {} is not in the cache and cannot be ordered",
                    scene_id.input_relative_path()
                );
                let moved = self
                    .service
                    .set_scene_unavailable(&scene_ref, &self.location, &log, Some("input not available"))
                    .await?;
                if moved {
                    report.unavailable += 1;
                }
                moved
            }
        };
        Ok(moved)
    }

    async fn finalize_orders(&self, report: &mut FinalizeReport) -> Result<(), FinalizeError> {
        let orders = self.service.finalize_orders().await?;
        for order in orders {
            report.completed_orders.push(order.id.clone());
            match self.notifier.notify(&order).await {
                Ok(()) => {
                    self.service.mark_order_notified(&order.id).await?;
                    report.notified += 1;
                }
                Err(e) => {
                    // Not marked; the order comes back next cycle.
                    warn!(order_id = %order.id, error = %e, "Completion notification failed");
                }
            }
        }
        Ok(())
    }

    async fn purge(&self, report: &mut FinalizeReport) -> Result<(), FinalizeError> {
        let candidates = self.service.get_scenes_to_purge().await?;
        if candidates.is_empty() {
            debug!("Nothing to purge");
            return Ok(());
        }

        for candidate in candidates {
            let scene = crate::status::SceneRef::new(&candidate.order_id, &candidate.scene_id);
            let locations = [
                candidate.product_location.as_deref(),
                candidate.checksum_location.as_deref(),
            ];
            match self.distributor.purge(&candidate.order_id, &locations).await {
                Ok(removed) => {
                    if self.service.mark_scene_purged(&scene).await? {
                        debug!(scene = %scene, files = removed, "Scene purged");
                        report.purged += 1;
                    }
                }
                Err(e) => {
                    warn!(scene = %scene, error = %e, "Failed to remove products; scene stays complete");
                    report.purge_failures += 1;
                }
            }
        }
        info!(purged = report.purged, failures = report.purge_failures, "Purge complete");
        Ok(())
    }

    /// Run cycles every `interval` until `shutdown` fires.
    pub async fn run_loop(&self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_secs = interval.as_secs(), "Finalizer started");
        loop {
            match self.run_cycle().await {
                Ok(report) => debug!(report = ?report, "Finalizer cycle complete"),
                Err(e) => error!(error = %e, "Finalizer cycle failed"),
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Finalizer shutting down");
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
    use crate::config::DistributionConfig;
    use crate::service::{LocalStatusService, ServiceError};
    use crate::status::{NewOrder, OrderStatus, SceneCompletion, SceneRef};
    use crate::testing::{fixtures, MockCommandRunner, MockInputAvailability, MockNotifier, MockTransport};

    struct Harness {
        service: Arc<LocalStatusService>,
        availability: Arc<MockInputAvailability>,
        notifier: Arc<MockNotifier>,
        transport: Arc<MockTransport>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                service: fixtures::in_memory_service(),
                availability: Arc::new(MockInputAvailability::new(Availability::OnCache)),
                notifier: Arc::new(MockNotifier::new()),
                transport: Arc::new(MockTransport::new()),
            }
        }

        fn finalizer(&self) -> Finalizer {
            let distributor = Distributor::new(
                DistributionConfig::local("/cache"),
                Arc::new(MockCommandRunner::new()),
                self.transport.clone(),
            );
            Finalizer::new(
                self.service.clone(),
                self.availability.clone(),
                self.notifier.clone(),
                Arc::new(distributor),
            )
            .with_location("finalizer-host")
        }

        async fn submit(&self, scenes: &[&str]) -> String {
            self.service
                .create_order(NewOrder {
                    submitter: "ops@example.org".to_string(),
                    options: Default::default(),
                    scenes: scenes.iter().map(|s| s.to_string()).collect(),
                    note: None,
                })
                .await
                .unwrap()
                .id
        }

        async fn complete(&self, order_id: &str, scene_id: &str) {
            let scene = SceneRef::new(order_id, scene_id);
            self.service.update_status(&scene, "f", SceneStatus::OnCache).await.unwrap();
            self.service.queue_scenes(&[scene.clone()], "d", "j").await.unwrap();
            self.service.update_status(&scene, "w", SceneStatus::Processing).await.unwrap();
            let done = self
                .service
                .mark_scene_complete(&SceneCompletion {
                    order_id: order_id.to_string(),
                    scene_id: scene_id.to_string(),
                    location: "w".to_string(),
                    product_location: format!("/cache/orders/{}/{}.tar.gz", order_id, scene_id),
                    checksum_location: format!("/cache/orders/{}/{}.md5", order_id, scene_id),
                    log: None,
                })
                .await
                .unwrap();
            assert!(done);
        }
    }

    #[tokio::test]
    async fn test_intake_moves_scenes_by_availability() {
        let h = Harness::new();
        let order_id = h
            .submit(&[fixtures::LANDSAT_SCENE, fixtures::MODIS_SCENE, "not-a-scene"])
            .await;
        h.availability.set(fixtures::LANDSAT_SCENE, Availability::Orderable);
        h.availability.set(fixtures::MODIS_SCENE, Availability::Unavailable);

        let report = h.finalizer().run_cycle().await.unwrap();
        assert_eq!(
            report.intake,
            IntakeReport {
                on_cache: 0,
                on_order: 1,
                unavailable: 1,
                skipped: 1
            }
        );

        let detail = h.service.get_order(&order_id).await.unwrap().unwrap();
        let status_of = |id: &str| detail.scenes.iter().find(|s| s.scene_id == id).unwrap().status;
        assert_eq!(status_of(fixtures::LANDSAT_SCENE), SceneStatus::OnOrder);
        assert_eq!(status_of(fixtures::MODIS_SCENE), SceneStatus::Unavailable);
        assert_eq!(status_of("not-a-scene"), SceneStatus::Submitted);

        // Once the input arrives, the on_order scene moves to the cache.
        h.availability.set(fixtures::LANDSAT_SCENE, Availability::OnCache);
        let report = h.finalizer().run_cycle().await.unwrap();
        assert_eq!(report.intake.on_cache, 1);
    }

    #[tokio::test]
    async fn test_intake_reaches_scenes_behind_a_full_page_of_stuck_ones() {
        let h = Harness::new();
        let stuck: Vec<String> = (0..INTAKE_PAGE + 5).map(|i| format!("BADSCENE{:05}", i)).collect();
        let stuck_refs: Vec<&str> = stuck.iter().map(String::as_str).collect();
        h.submit(&stuck_refs).await;
        let order_id = h.submit(&[fixtures::LANDSAT_SCENE, fixtures::MODIS_SCENE]).await;

        let report = h.finalizer().run_cycle().await.unwrap();
        assert_eq!(report.intake.skipped, INTAKE_PAGE + 5);
        assert_eq!(report.intake.on_cache, 2);

        let detail = h.service.get_order(&order_id).await.unwrap().unwrap();
        assert!(detail.scenes.iter().all(|s| s.status == SceneStatus::OnCache));
    }

    #[tokio::test]
    async fn test_intake_pages_see_every_scene_once() {
        let h = Harness::new();
        let count = INTAKE_PAGE / 2 + 100;
        let mut scenes = Vec::new();
        for i in 0..count {
            scenes.push(format!("BADSCENE{:05}", i));
            scenes.push(format!("LT5{:03}{:03}1996220XXX01", i / 100 + 1, i % 100 + 1));
        }
        let refs: Vec<&str> = scenes.iter().map(String::as_str).collect();
        let order_id = h.submit(&refs).await;

        let report = h.finalizer().run_cycle().await.unwrap();
        assert_eq!(report.intake.skipped, count);
        assert_eq!(report.intake.on_cache, count);

        let detail = h.service.get_order(&order_id).await.unwrap().unwrap();
        let moved = detail
            .scenes
            .iter()
            .filter(|s| s.status == SceneStatus::OnCache)
            .count();
        assert_eq!(moved, count);
    }

    #[tokio::test]
    async fn test_finished_order_notified_once() {
        let h = Harness::new();
        let order_id = h.submit(&[fixtures::LANDSAT_SCENE]).await;
        h.complete(&order_id, fixtures::LANDSAT_SCENE).await;

        let report = h.finalizer().run_cycle().await.unwrap();
        assert_eq!(report.completed_orders, vec![order_id.clone()]);
        assert_eq!(report.notified, 1);

        let report = h.finalizer().run_cycle().await.unwrap();
        assert!(report.completed_orders.is_empty());
        assert_eq!(h.notifier.notified(), vec![order_id.clone()]);

        let order = h.service.get_order(&order_id).await.unwrap().unwrap().order;
        assert_eq!(order.status, OrderStatus::Complete);
        assert!(order.notified_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_notification_is_retried() {
        let h = Harness::new();
        let order_id = h.submit(&[fixtures::LANDSAT_SCENE]).await;
        h.complete(&order_id, fixtures::LANDSAT_SCENE).await;
        h.notifier.fail_next(1);

        let report = h.finalizer().run_cycle().await.unwrap();
        assert_eq!(report.notified, 0);
        assert!(report.failed_steps.is_empty());

        let report = h.finalizer().run_cycle().await.unwrap();
        assert_eq!(report.notified, 1);
        assert_eq!(h.notifier.notified(), vec![order_id]);
    }

    #[tokio::test]
    async fn test_order_with_unresolved_scene_stays_open() {
        let h = Harness::new();
        let order_id = h.submit(&[fixtures::LANDSAT_SCENE, "not-a-scene"]).await;
        h.complete(&order_id, fixtures::LANDSAT_SCENE).await;

        let report = h.finalizer().run_cycle().await.unwrap();
        assert!(report.completed_orders.is_empty());
        let order = h.service.get_order(&order_id).await.unwrap().unwrap().order;
        assert_eq!(order.status, OrderStatus::Ordered);
    }

    #[tokio::test]
    async fn test_purge_removes_products_then_marks_purged() {
        let h = Harness::new();
        let service = fixtures::in_memory_service_with_retention(0);
        let h = Harness { service, ..h };
        let order_id = h.submit(&[fixtures::LANDSAT_SCENE]).await;
        h.complete(&order_id, fixtures::LANDSAT_SCENE).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let report = h.finalizer().run_cycle().await.unwrap();
        assert_eq!(report.purged, 1);
        assert_eq!(
            h.transport.removed(),
            vec![
                format!("/cache/orders/{}/{}.tar.gz", order_id, fixtures::LANDSAT_SCENE),
                format!("/cache/orders/{}/{}.md5", order_id, fixtures::LANDSAT_SCENE),
            ]
        );
        let scene = &h.service.get_order(&order_id).await.unwrap().unwrap().scenes[0];
        assert_eq!(scene.status, SceneStatus::Purged);
    }

    #[tokio::test]
    async fn test_failed_removal_keeps_scene_complete() {
        let h = Harness::new();
        let h = Harness {
            service: fixtures::in_memory_service_with_retention(0),
            ..h
        };
        let order_id = h.submit(&[fixtures::LANDSAT_SCENE]).await;
        h.complete(&order_id, fixtures::LANDSAT_SCENE).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        h.transport.fail_removals(true);

        let report = h.finalizer().run_cycle().await.unwrap();
        assert_eq!(report.purged, 0);
        assert_eq!(report.purge_failures, 1);
        let scene = &h.service.get_order(&order_id).await.unwrap().unwrap().scenes[0];
        assert_eq!(scene.status, SceneStatus::Complete);
    }

    #[tokio::test]
    async fn test_input_failure_does_not_stop_other_steps() {
        let h = Harness::new();
        let order_id = h.submit(&[fixtures::LANDSAT_SCENE, fixtures::MODIS_SCENE]).await;
        h.complete(&order_id, fixtures::LANDSAT_SCENE).await;
        h.availability.fail_with("input cache not mounted");

        let report = h.finalizer().run_cycle().await.unwrap();
        assert_eq!(report.failed_steps.len(), 1);
        assert_eq!(report.failed_steps[0].0, FinalizeStep::Intake);
    }

    #[tokio::test]
    async fn test_unavailable_service_aborts() {
        let h = Harness::new();
        let service = Arc::new(fixtures::UnavailableStatusService);
        let distributor = Distributor::new(
            DistributionConfig::local("/cache"),
            Arc::new(MockCommandRunner::new()),
            h.transport.clone(),
        );
        let finalizer = Finalizer::new(
            service,
            h.availability.clone(),
            h.notifier.clone(),
            Arc::new(distributor),
        );

        let err = finalizer.run_cycle().await.unwrap_err();
        assert!(matches!(err, FinalizeError::Status(ServiceError::Unavailable(_))));
    }
}
