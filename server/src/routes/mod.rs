//! Route handlers

pub mod classify;
pub mod health;
pub mod pages;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::state::SharedState;

/// Build the application router
pub fn router(state: SharedState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        // Web UI
        .route("/", get(pages::index))
        .route("/classify", post(classify::classify_page))

        // JSON API
        .route("/api/classify", post(classify::classify_api))

        // Health check
        .route("/health", get(health::health_check))

        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}
