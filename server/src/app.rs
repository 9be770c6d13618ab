use axum::Router;
use axum::routing::get;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;

use crate::routes;
use crate::state::AppState;

pub(crate) fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::api::health))
        .route("/api/metrics", get(routes::api::metrics))
        .route("/api/layers/{backend}", get(routes::api::get_layer))
        .layer(CompressionLayer::new())
        // Web map frontends load layers from their own origin.
        .layer(CorsLayer::permissive())
        .with_state(state)
}
