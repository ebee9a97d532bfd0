//! HTTP server setup and lifecycle for the request simulator.
//!
//! Configures axum with:
//! - The simulator routes
//! - Graceful shutdown driven by a watch channel

use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::Config;
use crate::error::Result;
use crate::simulator::{create_router, RouteTable};

/// Bind the configured address and serve until shutdown is signalled.
pub async fn run_server(config: Config, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    serve(listener, RouteTable::from_args(&config.simulator), shutdown_rx).await
}

/// Serve the simulator on an already bound listener.
///
/// Returns once `shutdown_rx` flips and in-flight requests have drained.
pub async fn serve(
    listener: TcpListener,
    routes: RouteTable,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let addr = listener.local_addr()?;
    let app = create_router(routes);

    tracing::info!(address = %addr, "Starting request simulator");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            // Wait for shutdown signal
            let _ = shutdown_rx.changed().await;
            tracing::info!("Shutdown signal received, stopping server");
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
