//! Ratecast Hub Binary
//!
//! Serves live exchange rates to WebSocket subscribers.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratecast_fx::OpenExchangeRatesProvider;
use ratecast_hub::{gateway, HubConfig, HubError, RateHub};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = HubConfig::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Ratecast Hub");

    if let Err(e) = config.validate().map_err(HubError::Configuration) {
        error!(error = %e, code = e.error_code(), "Invalid configuration");
        return Err(e.into());
    }

    let provider = OpenExchangeRatesProvider::new(config.upstream.provider_config())?;
    let hub = Arc::new(RateHub::new(config.clone(), Arc::new(provider)));

    let listener =
        tokio::net::TcpListener::bind((config.listen_addr.as_str(), config.listen_port)).await?;

    info!(
        listen_addr = %config.listen_addr,
        listen_port = %config.listen_port,
        base_currency = %config.base_currency,
        refresh_delay = ?config.refresh.delay,
        "Hub running"
    );

    let shutdown_hub = hub.clone();
    axum::serve(listener, gateway::router(hub))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Shutdown signal received");
            shutdown_hub.shutdown();
        })
        .await?;

    info!("Hub shutdown complete");
    Ok(())
}
