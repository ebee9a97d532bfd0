//! Error types for the tracing shim.

use std::time::Duration;

use opentelemetry::trace::TraceError;
use thiserror::Error;

/// Errors produced while configuring, starting or stopping the agent.
///
/// None of these are fatal to the host process: the bootstrap logs them and
/// keeps the application running uninstrumented.
#[derive(Debug, Error)]
pub enum ShimError {
    #[error("service name is required (set OTEL_SERVICE_NAME)")]
    MissingServiceName,

    #[error("collector endpoint is required (set OTEL_EXPORTER_OTLP_ENDPOINT)")]
    MissingEndpoint,

    #[error("invalid collector endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("backend {backend} requires an auth token (set OTEL_SHIM_AUTH_TOKEN)")]
    MissingAuthToken { backend: &'static str },

    #[error("invalid exporter header {0:?}, expected key=value")]
    InvalidHeader(String),

    #[error("invalid value {value:?} for {name}")]
    InvalidSetting { name: &'static str, value: String },

    #[error("invalid telemetry settings: {0}")]
    InvalidArgs(#[from] clap::Error),

    #[error("failed to build tracing pipeline: {0}")]
    Pipeline(#[from] TraceError),

    #[error("collector {endpoint} is unreachable: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("collector {endpoint} did not answer within {timeout:?}")]
    StartupTimeout { endpoint: String, timeout: Duration },

    #[error("pipeline shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ShimError>;
