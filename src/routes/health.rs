//! Health and status endpoints
//!
//! - `/healthz` - liveness plus the active routing target
//! - `/_status` - the sticky target, or the default one

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::routing::{Provider, ProviderModel};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    /// Sticky target, or `glm/auto` before the first request
    pub active: ProviderModel,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Liveness check with the current routing target
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let active = state
        .gateway
        .session()
        .get()
        .unwrap_or_else(|| ProviderModel::new(Provider::Glm, "auto"));

    Json(HealthResponse {
        ok: true,
        active,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// Current sticky target, falling back to the default one
pub async fn routing_status(State(state): State<Arc<AppState>>) -> Json<ProviderModel> {
    Json(
        state
            .gateway
            .session()
            .get()
            .unwrap_or_else(ProviderModel::fallback),
    )
}
