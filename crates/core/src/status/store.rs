//! Status storage trait.

use chrono::{DateTime, Utc};

use super::{
    NewOrder, Order, OrderFilter, PurgeCandidate, Scene, SceneCompletion, SceneFilter, SceneRef,
    SceneStatus, SceneToProcess, StatusError,
};

/// Durable record of orders and scenes.
///
/// Every status-changing method is a conditional update: it only applies
/// when the scene currently sits in a permitted predecessor status (or
/// already in the target status). Methods return `Ok(false)` when the edge
/// was refused or the scene is unknown, and never partially apply.
pub trait StatusStore: Send + Sync {
    /// Record a new order with its scenes in `submitted`.
    fn create_order(&self, order: NewOrder) -> Result<Order, StatusError>;

    fn get_order(&self, order_id: &str) -> Result<Option<Order>, StatusError>;

    fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StatusError>;

    fn get_scene(&self, scene: &SceneRef) -> Result<Option<Scene>, StatusError>;

    fn list_scenes(&self, filter: &SceneFilter) -> Result<Vec<Scene>, StatusError>;

    /// Number of scenes per status (statuses with no scenes omitted).
    fn count_scenes_by_status(&self) -> Result<Vec<(SceneStatus, i64)>, StatusError>;

    /// `on_cache` scenes, oldest order first, scenes in submission order.
    fn scenes_to_process(&self, limit: usize) -> Result<Vec<SceneToProcess>, StatusError>;

    /// Scenes in `error`, optionally restricted to one order.
    fn scenes_in_error(&self, order_id: Option<&str>) -> Result<Vec<SceneToProcess>, StatusError>;

    /// Move every listed scene to `queued`, or none of them.
    fn queue_scenes(
        &self,
        scenes: &[SceneRef],
        location: &str,
        job_name: &str,
    ) -> Result<usize, StatusError>;

    /// Move a scene to `on_order`, `on_cache`, `queued` or `processing`.
    /// Any other target returns `false` without touching the scene.
    fn update_status(
        &self,
        scene: &SceneRef,
        location: &str,
        status: SceneStatus,
    ) -> Result<bool, StatusError>;

    fn set_error(&self, scene: &SceneRef, location: &str, log: &str) -> Result<bool, StatusError>;

    fn set_unavailable(
        &self,
        scene: &SceneRef,
        location: &str,
        log: &str,
        note: Option<&str>,
    ) -> Result<bool, StatusError>;

    /// Record a completion and complete the order if this was its last scene.
    fn mark_complete(&self, completion: &SceneCompletion) -> Result<bool, StatusError>;

    /// Complete scenes whose completion date is strictly before `cutoff`.
    fn scenes_to_purge(&self, cutoff: DateTime<Utc>) -> Result<Vec<PurgeCandidate>, StatusError>;

    fn mark_purged(&self, scene: &SceneRef) -> Result<bool, StatusError>;

    /// Complete every order whose scenes are all finished, then return the
    /// completed orders that have not been notified yet.
    fn complete_finished_orders(&self) -> Result<Vec<Order>, StatusError>;

    fn mark_order_notified(&self, order_id: &str) -> Result<bool, StatusError>;

    /// Move `processing` scenes last updated before `cutoff` to `error`.
    fn reset_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
        log: &str,
    ) -> Result<Vec<SceneRef>, StatusError>;

    /// Count scenes sitting in `queued` since before `cutoff`.
    fn count_stale_queued(&self, cutoff: DateTime<Utc>) -> Result<i64, StatusError>;

    fn get_setting(&self, key: &str) -> Result<Option<String>, StatusError>;

    fn set_setting(&self, key: &str, value: &str) -> Result<(), StatusError>;
}
