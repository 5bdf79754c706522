//! Health check endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use tumorscan::backend::backend_name;
use tumorscan::ModelKind;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub backend: String,
    pub loaded_models: Vec<ModelKind>,
    pub explainer_configured: bool,
    pub cached_saliency_maps: usize,
    pub saliency_cache_capacity: usize,
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: backend_name().to_string(),
        loaded_models: state.loaded_models(),
        explainer_configured: state.explainer.is_some(),
        cached_saliency_maps: state.saliency_cache.len(),
        saliency_cache_capacity: state.saliency_cache.capacity(),
    })
}
