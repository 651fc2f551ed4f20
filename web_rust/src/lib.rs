pub mod config;
pub mod handlers;
pub mod models;
pub mod upload;
pub mod worker;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

// Re-export main types
pub use config::{Config, Secret};
pub use models::{AppState, StoredFile};
pub use worker::{DispatchError, Worker};

/// Request body ceiling, above the per-file limit so the upload validator sees oversized images
pub const BODY_LIMIT: usize = 2 * upload::MAX_UPLOAD_BYTES as usize;

/// Build the HTTP surface: landing page, upload endpoint and static assets
pub fn create_router(state: Arc<AppState>) -> Router {
    let assets = ServeDir::new(&state.static_dir);

    Router::new()
        .route("/", get(handlers::root))
        .route("/upload", post(handlers::upload_image))
        .fallback_service(assets)
        .layer(middleware::from_fn(handlers::reject_hidden))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
