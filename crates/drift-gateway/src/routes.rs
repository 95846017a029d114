//! HTTP route definitions

use crate::{handlers, AppState};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        // File endpoints
        .route("/files", post(handlers::files::upload))
        .route("/files/{reference}", get(handlers::files::download))
        // Directory endpoints
        .route("/dirs", post(handlers::dirs::upload))
        // Manifest path resolution
        .route("/bzz/{reference}/{*path}", get(handlers::bzz::download))
        // Apply middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .with_state(state)
}
