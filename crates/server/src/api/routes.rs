use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::middleware::{auth_middleware, metrics_middleware};
use super::{bundles, compose, handlers, webhooks};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // User-facing routes go through the configured authenticator
    let bundle_routes = Router::new()
        .route(
            "/bundles",
            post(bundles::create_bundle).get(bundles::list_bundles),
        )
        .route("/bundles/{id}", get(bundles::get_bundle))
        .route("/bundles/{id}/jobs", get(bundles::list_bundle_jobs))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Callbacks authenticate with the shared secret
        .route("/webhooks/assets", post(webhooks::asset_webhook))
        .route("/webhooks/renders", post(webhooks::render_webhook))
        // Secret or API key, checked by the handler
        .route("/bundles/{id}/compose", post(compose::compose_bundle))
        .merge(bundle_routes);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
