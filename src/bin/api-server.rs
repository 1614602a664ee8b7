//! LedgerLens API Server
//!
//! Serves category suggestions, records feedback and exposes the manual
//! promotion trigger. Stateless apart from the store, so it scales
//! horizontally.

use dotenvy::dotenv;
use ledgerlens::config;
use ledgerlens::core::bootstrap::{connect_store, ServiceOptions, Services};
use ledgerlens::core::http::start_server;
use ledgerlens::logging;
use ledgerlens::metrics::Metrics;
use std::env;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    logging::init_logging();

    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let env = config::get_environment();
    info!("Starting LedgerLens API Server");
    info!(environment = %env, "Environment");

    let metrics = Arc::new(Metrics::new()?);
    let store = connect_store(config::get_store_backend(), &metrics).await?;
    let options = ServiceOptions::from_env(&metrics).await;
    let services = Arc::new(Services::build(store, options, metrics).await);

    let server_services = services.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(port, &server_services).await {
            error!(error = %e, "HTTP server error");
        }
    });

    info!(port = port, "API server started, waiting for shutdown signal...");
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutting down API server...");
        }
        _ = server_handle => {
            error!("HTTP server stopped");
        }
    }

    Ok(())
}
