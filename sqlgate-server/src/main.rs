//! sqlgate-server binary: the gateway's HTTP service.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sqlgate_connectors::DriverCatalog;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sqlgate_server::{http, Gateway, GatewayMetrics, JsonFileBacking, ProfileStore, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting sqlgate-server on {}", config.bind_addr());

    let catalog = Arc::new(DriverCatalog::with_defaults());
    let backing = Arc::new(JsonFileBacking::new(config.profiles_path.clone()));
    let profiles = ProfileStore::open(backing, Arc::clone(&catalog)).await?;

    let gateway = Arc::new(Gateway::new(
        catalog,
        profiles,
        config.pool_settings(),
        GatewayMetrics::new(),
    ));
    gateway.initialize().await;

    let app = http::router(Arc::clone(&gateway));

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("binding {}", config.bind_addr()))?;
    info!("Listening on {}", config.bind_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    gateway.shutdown().await;
    Ok(())
}
