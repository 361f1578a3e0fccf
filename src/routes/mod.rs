//! HTTP routes for claude-proxy
//!
//! This module defines all HTTP endpoints exposed by the gateway.

pub mod health;
pub mod messages;
pub mod metrics;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new().route("/v1/messages", post(messages::create_message));

    let public_routes = Router::new()
        .route("/healthz", get(health::health_check))
        .route("/_status", get(health::routing_status))
        .route("/metrics", get(metrics::prometheus_metrics));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
