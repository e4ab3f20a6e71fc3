use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{generations, handlers, middleware::metrics_middleware, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Generations
        .route("/generations", post(generations::start_generation))
        .route(
            "/generations/{token}",
            get(generations::get_generation).delete(generations::cancel_generation),
        )
        .route(
            "/generations/{token}/artifacts/{kind}",
            get(generations::get_artifact),
        )
        .route(
            "/generations/{token}/artifacts/{kind}/refetch",
            post(generations::refetch_artifact),
        )
        // Real-time updates
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn(metrics_middleware));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
