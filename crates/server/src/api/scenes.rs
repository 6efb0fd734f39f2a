//! Scene API handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use reprocess_core::service::{
    QueueScenesRequest, QueueScenesResponse, ReconcileReport, SceneCompleteRequest,
    SceneErrorRequest, SceneUnavailableRequest, UpdateResponse, UpdateStatusRequest,
};
use reprocess_core::status::{PurgeCandidate, Scene, SceneCompletion, SceneToProcess};
use reprocess_core::{SceneRef, SceneStatus, StatusService};

use super::ApiError;
use crate::metrics::{record_transition, SCENE_TRANSITIONS};
use crate::state::AppState;

/// Maximum allowed limit for scene queries
const MAX_LIMIT: usize = 10_000;

/// Default limit for scene queries
const DEFAULT_LIMIT: usize = 500;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RetryParams {
    pub order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListScenesParams {
    pub status: String,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

fn transition(to: SceneStatus, updated: bool) -> Json<UpdateResponse> {
    record_transition(to, updated);
    Json(UpdateResponse { updated })
}

// ============================================================================
// Handlers
// ============================================================================

/// Scenes whose input is on cache, ready for dispatch.
pub async fn scenes_to_process(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<SceneToProcess>>, ApiError> {
    let scenes = state
        .service()
        .get_scenes_to_process(clamp_limit(params.limit))
        .await?;
    Ok(Json(scenes))
}

pub async fn scenes_to_retry(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RetryParams>,
) -> Result<Json<Vec<SceneToProcess>>, ApiError> {
    let scenes = state
        .service()
        .get_scenes_to_retry(params.order_id.as_deref())
        .await?;
    Ok(Json(scenes))
}

pub async fn queue_scenes(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QueueScenesRequest>,
) -> Result<Json<QueueScenesResponse>, ApiError> {
    if body.job_name.trim().is_empty() {
        return Err(ApiError::bad_request("job_name cannot be empty"));
    }
    let queued = state
        .service()
        .queue_scenes(&body.scenes, &body.location, &body.job_name)
        .await?;
    SCENE_TRANSITIONS
        .with_label_values(&[SceneStatus::Queued.as_str()])
        .inc_by(queued as u64);
    Ok(Json(QueueScenesResponse { queued }))
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path((order_id, scene_id)): Path<(String, String)>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<UpdateResponse>, ApiError> {
    if !body.status.is_generic_target() {
        return Err(ApiError::bad_request(format!(
            "status {} has its own endpoint",
            body.status
        )));
    }
    let scene = SceneRef::new(order_id, scene_id);
    let updated = state
        .service()
        .update_status(&scene, &body.location, body.status)
        .await?;
    Ok(transition(body.status, updated))
}

pub async fn set_error(
    State(state): State<Arc<AppState>>,
    Path((order_id, scene_id)): Path<(String, String)>,
    Json(body): Json<SceneErrorRequest>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let scene = SceneRef::new(order_id, scene_id);
    let updated = state
        .service()
        .set_scene_error(&scene, &body.location, &body.log)
        .await?;
    Ok(transition(SceneStatus::Error, updated))
}

pub async fn set_unavailable(
    State(state): State<Arc<AppState>>,
    Path((order_id, scene_id)): Path<(String, String)>,
    Json(body): Json<SceneUnavailableRequest>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let scene = SceneRef::new(order_id, scene_id);
    let updated = state
        .service()
        .set_scene_unavailable(&scene, &body.location, &body.log, body.note.as_deref())
        .await?;
    Ok(transition(SceneStatus::Unavailable, updated))
}

pub async fn mark_complete(
    State(state): State<Arc<AppState>>,
    Path((order_id, scene_id)): Path<(String, String)>,
    Json(body): Json<SceneCompleteRequest>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let completion = SceneCompletion {
        order_id,
        scene_id,
        location: body.location,
        product_location: body.product_location,
        checksum_location: body.checksum_location,
        log: body.log,
    };
    let updated = state.service().mark_scene_complete(&completion).await?;
    Ok(transition(SceneStatus::Complete, updated))
}

pub async fn mark_purged(
    State(state): State<Arc<AppState>>,
    Path((order_id, scene_id)): Path<(String, String)>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let scene = SceneRef::new(order_id, scene_id);
    let updated = state.service().mark_scene_purged(&scene).await?;
    Ok(transition(SceneStatus::Purged, updated))
}

/// Completed scenes past the retention window.
pub async fn scenes_to_purge(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PurgeCandidate>>, ApiError> {
    Ok(Json(state.service().get_scenes_to_purge().await?))
}

pub async fn list_scenes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListScenesParams>,
) -> Result<Json<Vec<Scene>>, ApiError> {
    let status: SceneStatus = params.status.parse().map_err(ApiError::bad_request)?;
    let scenes = state
        .service()
        .list_scenes(status, clamp_limit(params.limit), params.offset.unwrap_or(0))
        .await?;
    Ok(Json(scenes))
}

pub async fn reconcile(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReconcileReport>, ApiError> {
    let report = state.service().reconcile_stale_scenes().await?;
    SCENE_TRANSITIONS
        .with_label_values(&[SceneStatus::Error.as_str()])
        .inc_by(report.reset.len() as u64);
    Ok(Json(report))
}
