//! Router configuration for the web server.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the router with all routes.
///
/// Both prediction paths are also served without the trailing slash.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(handlers::landing))
        .route("/health", get(handlers::health))
        .route("/classifier/docu_predict/", post(handlers::docu_predict))
        .route("/classifier/docu_predict", post(handlers::docu_predict))
        .route(
            "/classifier/docu_predict/detailed/",
            post(handlers::docu_predict_detailed),
        )
        .route(
            "/classifier/docu_predict/detailed",
            post(handlers::docu_predict_detailed),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        // Mirrors the request origin so credentialed requests are accepted.
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}
