//! Logging setup.
//!
//! Configures structured logging with:
//! - Text or JSON output
//! - Environment-based filter
//! - An optional OpenTelemetry layer fed by the agent's tracer

use opentelemetry_sdk::trace::Tracer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// Filter used when `log_level` is not a valid directive. Transport crates
/// are kept quiet so the exporter does not trace its own requests.
pub const DEFAULT_FILTER: &str = "info,otel_shim=debug,h2=warn,hyper=warn,tonic=warn,reqwest=warn";

/// Initialize logging.
///
/// This sets up:
/// - Console logging with structured format
/// - A filter from `log_level` (normally `RUST_LOG`)
/// - Span export through `tracer` when the agent built a pipeline
///
/// # Panics
///
/// Panics if tracing has already been initialized.
pub fn init_tracing(log_level: &str, format: LogFormat, tracer: Option<Tracer>) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let instrumented = tracer.is_some();

    let otel_layer = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    let text_layer = (format == LogFormat::Text).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });

    let json_layer = (format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(text_layer)
        .with(json_layer)
        .init();

    tracing::info!(instrumented, "Logging initialized");
}

/// Initialize tracing for tests (only logs errors).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("error")
        .with_test_writer()
        .try_init();
}
