use async_trait::async_trait;

use super::{OrderDetail, ReconcileReport, ServiceError};
use crate::status::{
    NewOrder, Order, PurgeCandidate, Scene, SceneCompletion, SceneRef, SceneStatus,
    SceneToProcess,
};

/// The operations every component uses to read and move scene state.
///
/// Implemented in-process over a [`crate::status::StatusStore`] and over
/// HTTP for components running elsewhere. Transition methods return
/// `Ok(false)` when the requested edge is not permitted.
#[async_trait]
pub trait StatusService: Send + Sync {
    /// Scenes ready for dispatch (`on_cache`), oldest order first.
    async fn get_scenes_to_process(
        &self,
        limit: usize,
    ) -> Result<Vec<SceneToProcess>, ServiceError>;

    /// Scenes in `error`, optionally for one order.
    async fn get_scenes_to_retry(
        &self,
        order_id: Option<&str>,
    ) -> Result<Vec<SceneToProcess>, ServiceError>;

    /// Mark dispatched scenes `queued`. Returns how many moved.
    async fn queue_scenes(
        &self,
        scenes: &[SceneRef],
        location: &str,
        job_name: &str,
    ) -> Result<usize, ServiceError>;

    async fn update_status(
        &self,
        scene: &SceneRef,
        location: &str,
        status: SceneStatus,
    ) -> Result<bool, ServiceError>;

    async fn set_scene_error(
        &self,
        scene: &SceneRef,
        location: &str,
        log: &str,
    ) -> Result<bool, ServiceError>;

    async fn set_scene_unavailable(
        &self,
        scene: &SceneRef,
        location: &str,
        log: &str,
        note: Option<&str>,
    ) -> Result<bool, ServiceError>;

    async fn mark_scene_complete(&self, completion: &SceneCompletion)
        -> Result<bool, ServiceError>;

    /// Completed scenes older than the retention window.
    async fn get_scenes_to_purge(&self) -> Result<Vec<PurgeCandidate>, ServiceError>;

    async fn mark_scene_purged(&self, scene: &SceneRef) -> Result<bool, ServiceError>;

    async fn get_configuration(&self, key: &str) -> Result<Option<String>, ServiceError>;

    /// Scenes in `status`, oldest order first, skipping the first `offset`.
    async fn list_scenes(
        &self,
        status: SceneStatus,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Scene>, ServiceError>;

    /// Complete finished orders and return those still awaiting notification.
    async fn finalize_orders(&self) -> Result<Vec<Order>, ServiceError>;

    async fn mark_order_notified(&self, order_id: &str) -> Result<bool, ServiceError>;

    /// Move long-silent `processing` scenes to `error`.
    async fn reconcile_stale_scenes(&self) -> Result<ReconcileReport, ServiceError>;

    async fn create_order(&self, order: NewOrder) -> Result<Order, ServiceError>;

    async fn get_order(&self, order_id: &str) -> Result<Option<OrderDetail>, ServiceError>;
}
