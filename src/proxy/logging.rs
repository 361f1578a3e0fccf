//! Request logging utilities
//!
//! Structured logging with a short correlation id, so the dispatcher and the
//! relay task of one request can be matched up in the logs.

use std::time::Instant;

use tracing::{debug, error, info, warn, Span};
use uuid::Uuid;

use crate::routing::{Advisory, Provider, ProviderModel};

/// Context for tracking a request through dispatch and relay
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Short id for log correlation
    pub trace_id: String,
    pub start_time: Instant,
    pub provider: Provider,
    pub model: String,
    /// Whether the caller asked for a stream
    pub streaming: bool,
}

impl RequestContext {
    pub fn new(target: &ProviderModel, streaming: bool) -> Self {
        Self {
            trace_id: Uuid::new_v4().simple().to_string()[..8].to_string(),
            start_time: Instant::now(),
            provider: target.provider,
            model: target.model.clone(),
            streaming,
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start_time.elapsed().as_millis()
    }

    pub fn log_request_start(&self) {
        info!(
            trace_id = %self.trace_id,
            provider = %self.provider,
            model = %self.model,
            streaming = %self.streaming,
            "Request routed"
        );
    }

    pub fn log_advisory(&self, advisory: &Advisory) {
        warn!(
            trace_id = %self.trace_id,
            provider = %self.provider,
            model = %self.model,
            advisory = %advisory,
            "Capability advisory"
        );
    }

    pub fn log_upstream_request(&self, url: &str) {
        debug!(
            trace_id = %self.trace_id,
            provider = %self.provider,
            url = %url,
            elapsed_ms = %self.elapsed_ms(),
            "Sending request to upstream"
        );
    }

    /// Upstream answered 2xx and the body is being relayed
    pub fn log_stream_started(&self) {
        info!(
            trace_id = %self.trace_id,
            provider = %self.provider,
            elapsed_ms = %self.elapsed_ms(),
            "Upstream stream opened"
        );
    }

    pub fn log_stream_ended(&self, events: usize, outcome: &str) {
        info!(
            trace_id = %self.trace_id,
            provider = %self.provider,
            model = %self.model,
            events = %events,
            outcome = %outcome,
            elapsed_ms = %self.elapsed_ms(),
            "Relay finished"
        );
    }

    pub fn log_disconnect(&self, events: usize) {
        debug!(
            trace_id = %self.trace_id,
            provider = %self.provider,
            events = %events,
            elapsed_ms = %self.elapsed_ms(),
            "Downstream disconnected, upstream cancelled"
        );
    }

    pub fn log_error(&self, error: &str) {
        error!(
            trace_id = %self.trace_id,
            provider = %self.provider,
            model = %self.model,
            streaming = %self.streaming,
            elapsed_ms = %self.elapsed_ms(),
            error = %error,
            "Request failed"
        );
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "relay",
            trace_id = %self.trace_id,
            provider = %self.provider,
            model = %self.model,
        )
    }
}
