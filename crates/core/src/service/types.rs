//! Request and response bodies shared by the HTTP server and client.

use serde::{Deserialize, Serialize};

use crate::status::{Order, Scene, SceneRef, SceneStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueScenesRequest {
    pub scenes: Vec<SceneRef>,
    pub location: String,
    pub job_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueScenesResponse {
    pub queued: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub location: String,
    pub status: SceneStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneErrorRequest {
    pub location: String,
    pub log: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneUnavailableRequest {
    pub location: String,
    pub log: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneCompleteRequest {
    pub location: String,
    pub product_location: String,
    pub checksum_location: String,
    #[serde(default)]
    pub log: Option<String>,
}

/// Whether a transition was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub updated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationValue {
    pub key: String,
    pub value: Option<String>,
}

/// Outcome of a reconciliation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Scenes moved from `processing` to `error`.
    pub reset: Vec<SceneRef>,
    /// Scenes still `queued` past the stale threshold.
    pub stale_queued: i64,
}

/// An order together with its scenes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub scenes: Vec<Scene>,
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
