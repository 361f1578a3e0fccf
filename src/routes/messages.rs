//! Messages endpoint
//!
//! Anthropic Messages API: `POST /v1/messages`.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::HeaderMap, response::Response};
use tracing::warn;

use crate::{
    canonical::CanonicalRequest,
    error::{AppError, AppResult},
    proxy::headers::ANTHROPIC_BETA,
    routes::metrics::record_rejection,
    AppState,
};

/// Messages handler
///
/// The body is parsed by hand so a malformed request yields a canonical
/// `invalid_request_error` rather than axum's plain-text rejection.
pub async fn create_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let result = handle(&state, &headers, &body).await;
    if let Err(error) = &result {
        warn!(error = %error, status = %error.status_code(), "Request rejected");
        record_rejection(error.reason());
    }
    result
}

async fn handle(state: &AppState, headers: &HeaderMap, body: &[u8]) -> AppResult<Response> {
    let request = CanonicalRequest::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?;

    let beta = headers
        .get(ANTHROPIC_BETA)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    state.gateway.dispatch(request, beta).await
}
