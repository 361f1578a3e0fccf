//! claude-proxy - local Anthropic Messages API gateway
//!
//! Accepts Messages API requests, picks a backend from the model string and
//! the sticky routing state, translates the request for that backend and
//! relays its streamed answer back as canonical events.

pub mod canonical;
pub mod config;
pub mod error;
pub mod gateway;
pub mod proxy;
pub mod routes;
pub mod routing;
pub mod streaming;
pub mod translate;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

pub use crate::config::Config;
pub use crate::gateway::Gateway;
pub use crate::routing::{Provider, ProviderModel};

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Gateway,
    pub start_time: Instant,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config) -> Result<Self> {
        // Upstream reads are bounded by the relay's idle timeout instead of
        // a whole-request timeout, so long streams are not cut off
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(100)
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        let config = Arc::new(config);
        let gateway = Gateway::new(config.clone(), http_client);

        Ok(Self {
            config,
            gateway,
            start_time: Instant::now(),
        })
    }
}
