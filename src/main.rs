//! otel-shim: request simulator with an OpenTelemetry tracing bootstrap.
//!
//! # Usage
//!
//! ```bash
//! OTEL_SERVICE_NAME=demo OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 otel-shim
//! ```
//!
//! Environment variables:
//! - `OTEL_SERVICE_NAME` / `OTEL_SERVICE_NAMESPACE`: Resource attributes
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: Collector URL
//! - `OTEL_SHIM_BACKEND`: otlp-grpc, otlp-http or vendor
//! - `OTEL_SHIM_AUTH_TOKEN`: Bearer token for authenticated collectors
//! - `SIM_HOST` / `SIM_PORT`: Listener address (default 0.0.0.0:8000)
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use std::future::Future;

use otel_shim::agent::Agent;
use otel_shim::config::Config;
use otel_shim::error::ShimError;
use otel_shim::observability::tracing::init_tracing;
use otel_shim::server::run_server;
use tokio::sync::watch;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        r#"
  otel-shim v{} - tracing bootstrap + request simulator

  Configuration:
    Address:    {}:{}
    Service:    {}
    Collector:  {}
    Backend:    {}
    Log Level:  {}

  Send SIGTERM or press Ctrl+C to flush traces and exit.
"#,
        version,
        config.host,
        config.port,
        config.telemetry.service_name.as_deref().unwrap_or("-"),
        config.telemetry.otel_endpoint.as_deref().unwrap_or("-"),
        config.telemetry.backend.as_deref().unwrap_or("otlp-grpc"),
        config.log_level
    );
}

/// Resolves on SIGTERM or SIGINT (Ctrl+C).
///
/// The SIGTERM handler is installed before this returns, so a signal sent as
/// soon as the listener is up is not lost.
fn shutdown_signal() -> impl Future<Output = ()> {
    #[cfg(unix)]
    let sigterm = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate())
    };

    async move {
        #[cfg(unix)]
        {
            match sigterm {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {
                            tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                        }
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating shutdown...");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler, waiting for Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!("Received Ctrl+C, initiating shutdown...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    // Build the pipeline first so logging can bridge spans into it
    let agent = Agent::from_settings(&config.telemetry);

    init_tracing(&config.log_level, config.log_format, agent.tracer());
    print_banner(&config);

    let handle = agent.start();

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal = shutdown_signal();
    tokio::spawn(async move {
        signal.await;
        let _ = shutdown_tx.send(true);
    });

    let served = run_server(config.clone(), shutdown_rx).await;
    if let Err(e) = &served {
        tracing::error!(error = %e, "Request simulator failed");
    }

    // Best effort: telemetry loss never changes the exit status.
    if let Err(ShimError::ShutdownTimeout(_)) = handle.shutdown(config.shutdown_timeout()).await {
        // A stuck flush would keep the runtime from dropping.
        std::process::exit(0);
    }

    served?;
    tracing::info!("otel-shim shutdown complete");
    Ok(())
}
