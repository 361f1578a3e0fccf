//! claude-proxy - local Anthropic Messages API gateway
//!
//! This is the main entry point for the gateway server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

use claude_proxy::config::{self, LogFormat};
use claude_proxy::{routes, AppState, Config, Provider};

#[tokio::main]
async fn main() -> Result<()> {
    // ~/.claude-proxy/.env, then ./.env
    config::load_env_files();

    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "claude_proxy=info,tower_http=info".into()),
        )
        .with_target(true)
        .with_thread_ids(true);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }

    info!("Starting claude-proxy");
    for provider in Provider::ALL {
        let configured = config.endpoint(provider).credential().is_some();
        info!(provider = %provider, configured = %configured, "Provider credentials");
    }

    routes::metrics::init_metrics();
    info!("Metrics initialized");

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid listen address")?;

    let state = Arc::new(AppState::new(config)?);
    let app = routes::create_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("claude-proxy shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating shutdown");
        }
    }
}
