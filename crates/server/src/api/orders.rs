//! Order and configuration API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use reprocess_core::service::{ConfigurationValue, OrderDetail, UpdateResponse};
use reprocess_core::status::{NewOrder, Order, OrderFilter, OrderStatus, StatusStore};
use reprocess_core::{ServiceError, StatusService};

use super::ApiError;
use crate::metrics::ORDERS_COMPLETED_TOTAL;
use crate::state::AppState;

/// Maximum allowed limit for order queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for order queries
const DEFAULT_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListOrdersParams {
    pub status: Option<String>,
    pub submitter: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListOrdersResponse {
    pub orders: Vec<Order>,
    pub limit: i64,
    pub offset: i64,
}

/// Order intake.
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.service().create_order(body).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderDetail>, ApiError> {
    match state.service().get_order(&order_id).await? {
        Some(detail) => Ok(Json(detail)),
        None => Err(ApiError(ServiceError::NotFound(format!("order {}", order_id)))),
    }
}

pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<ListOrdersResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = OrderFilter::new().with_limit(limit).with_offset(offset);
    if let Some(status) = params.status {
        let status: OrderStatus = status.parse().map_err(ApiError::bad_request)?;
        filter = filter.with_status(status);
    }
    if let Some(submitter) = params.submitter {
        filter = filter.with_submitter(submitter);
    }

    let orders = state
        .service()
        .store()
        .list_orders(&filter)
        .map_err(ServiceError::from)?;
    Ok(Json(ListOrdersResponse {
        orders,
        limit,
        offset,
    }))
}

/// Complete finished orders; returns those awaiting notification.
pub async fn finalize_orders(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.service().finalize_orders().await?))
}

pub async fn mark_notified(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let updated = state.service().mark_order_notified(&order_id).await?;
    if updated {
        ORDERS_COMPLETED_TOTAL.inc();
    }
    Ok(Json(UpdateResponse { updated }))
}

pub async fn get_configuration(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<ConfigurationValue>, ApiError> {
    let value = state.service().get_configuration(&key).await?;
    Ok(Json(ConfigurationValue { key, value }))
}
