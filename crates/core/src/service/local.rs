//! In-process Status Service over a [`StatusStore`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{info, warn};

use super::{OrderDetail, ReconcileReport, ServiceError, StatusService};
use crate::config::RetentionConfig;
use crate::status::{
    NewOrder, Order, PurgeCandidate, Scene, SceneCompletion, SceneFilter, SceneRef, SceneStatus,
    SceneToProcess, StatusStore,
};

pub struct LocalStatusService {
    store: Arc<dyn StatusStore>,
    retention: RetentionConfig,
}

impl LocalStatusService {
    pub fn new(store: Arc<dyn StatusStore>, retention: RetentionConfig) -> Self {
        Self { store, retention }
    }

    pub fn store(&self) -> &Arc<dyn StatusStore> {
        &self.store
    }

    /// Write the configured settings table into the store.
    pub fn seed_settings(&self, settings: &BTreeMap<String, String>) -> Result<(), ServiceError> {
        for (key, value) in settings {
            self.store.set_setting(key, value)?;
        }
        if !settings.is_empty() {
            info!(count = settings.len(), "Seeded configuration settings");
        }
        Ok(())
    }
}

#[async_trait]
impl StatusService for LocalStatusService {
    async fn get_scenes_to_process(
        &self,
        limit: usize,
    ) -> Result<Vec<SceneToProcess>, ServiceError> {
        Ok(self.store.scenes_to_process(limit)?)
    }

    async fn get_scenes_to_retry(
        &self,
        order_id: Option<&str>,
    ) -> Result<Vec<SceneToProcess>, ServiceError> {
        Ok(self.store.scenes_in_error(order_id)?)
    }

    async fn queue_scenes(
        &self,
        scenes: &[SceneRef],
        location: &str,
        job_name: &str,
    ) -> Result<usize, ServiceError> {
        Ok(self.store.queue_scenes(scenes, location, job_name)?)
    }

    async fn update_status(
        &self,
        scene: &SceneRef,
        location: &str,
        status: SceneStatus,
    ) -> Result<bool, ServiceError> {
        Ok(self.store.update_status(scene, location, status)?)
    }

    async fn set_scene_error(
        &self,
        scene: &SceneRef,
        location: &str,
        log: &str,
    ) -> Result<bool, ServiceError> {
        Ok(self.store.set_error(scene, location, log)?)
    }

    async fn set_scene_unavailable(
        &self,
        scene: &SceneRef,
        location: &str,
        log: &str,
        note: Option<&str>,
    ) -> Result<bool, ServiceError> {
        Ok(self.store.set_unavailable(scene, location, log, note)?)
    }

    async fn mark_scene_complete(
        &self,
        completion: &SceneCompletion,
    ) -> Result<bool, ServiceError> {
        Ok(self.store.mark_complete(completion)?)
    }

    async fn get_scenes_to_purge(&self) -> Result<Vec<PurgeCandidate>, ServiceError> {
        let cutoff = Utc::now() - Duration::days(i64::from(self.retention.days));
        Ok(self.store.scenes_to_purge(cutoff)?)
    }

    async fn mark_scene_purged(&self, scene: &SceneRef) -> Result<bool, ServiceError> {
        Ok(self.store.mark_purged(scene)?)
    }

    async fn get_configuration(&self, key: &str) -> Result<Option<String>, ServiceError> {
        Ok(self.store.get_setting(key)?)
    }

    async fn list_scenes(
        &self,
        status: SceneStatus,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Scene>, ServiceError> {
        let filter = SceneFilter::new()
            .with_status(status)
            .with_limit(limit as i64)
            .with_offset(offset as i64);
        Ok(self.store.list_scenes(&filter)?)
    }

    async fn finalize_orders(&self) -> Result<Vec<Order>, ServiceError> {
        Ok(self.store.complete_finished_orders()?)
    }

    async fn mark_order_notified(&self, order_id: &str) -> Result<bool, ServiceError> {
        Ok(self.store.mark_order_notified(order_id)?)
    }

    async fn reconcile_stale_scenes(&self) -> Result<ReconcileReport, ServiceError> {
        let hours = self.retention.stale_processing_hours;
        let cutoff = Utc::now() - Duration::hours(i64::from(hours));
        let log = format!("no status reported for over {} hours", hours);

        let reset = self.store.reset_stale_processing(cutoff, &log)?;
        let stale_queued = self.store.count_stale_queued(cutoff)?;
        if stale_queued > 0 {
            warn!(
                stale_queued,
                hours, "Scenes queued past the stale threshold; their jobs may have died"
            );
        }
        if !reset.is_empty() {
            info!(count = reset.len(), "Reset stale processing scenes to error");
        }
        Ok(ReconcileReport {
            reset,
            stale_queued,
        })
    }

    async fn create_order(&self, order: NewOrder) -> Result<Order, ServiceError> {
        Ok(self.store.create_order(order)?)
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<OrderDetail>, ServiceError> {
        let Some(order) = self.store.get_order(order_id)? else {
            return Ok(None);
        };
        let scenes = self
            .store
            .list_scenes(&SceneFilter::new().with_order(order_id).with_limit(i64::MAX))?;
        Ok(Some(OrderDetail { order, scenes }))
    }
}
