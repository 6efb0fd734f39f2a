use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware::metrics_middleware, orders, scenes};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/configuration/{key}", get(orders::get_configuration))
        // Scene selection
        .route("/scenes", get(scenes::list_scenes))
        .route("/scenes/to-process", get(scenes::scenes_to_process))
        .route("/scenes/to-retry", get(scenes::scenes_to_retry))
        .route("/scenes/to-purge", get(scenes::scenes_to_purge))
        .route("/scenes/queue", post(scenes::queue_scenes))
        .route("/scenes/reconcile", post(scenes::reconcile))
        // Scene transitions
        .route("/orders/{order_id}/scenes/{scene_id}/status", post(scenes::update_status))
        .route("/orders/{order_id}/scenes/{scene_id}/error", post(scenes::set_error))
        .route("/orders/{order_id}/scenes/{scene_id}/unavailable", post(scenes::set_unavailable))
        .route("/orders/{order_id}/scenes/{scene_id}/complete", post(scenes::mark_complete))
        .route("/orders/{order_id}/scenes/{scene_id}/purged", post(scenes::mark_purged))
        // Orders
        .route("/orders", post(orders::create_order).get(orders::list_orders))
        .route("/orders/finalize", post(orders::finalize_orders))
        .route("/orders/{order_id}", get(orders::get_order))
        .route("/orders/{order_id}/notified", post(orders::mark_notified));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
