//! otel-shim: an OpenTelemetry tracing bootstrap for services.
//!
//! The shim reads the standard `OTEL_*` environment, builds an OTLP exporter
//! pipeline with a batching span processor, starts it without blocking the
//! host, and drains it under a bounded timeout at shutdown. Instrumentation
//! failures are logged and never take the host down.
//!
//! # Modules
//!
//! - [`agent`]: Pipeline lifecycle (`initialize`, `shutdown`)
//! - [`config`]: CLI and environment configuration
//! - [`error`]: Error taxonomy
//! - [`observability`]: Logging and trace context propagation
//! - [`server`]: HTTP server lifecycle
//! - [`simulator`]: Demo routes with jittered latency

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // agent::AgentState is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::missing_panics_doc       // Panic docs can be verbose
)]

pub mod agent;
pub mod config;
pub mod error;
pub mod observability;
pub mod server;
pub mod simulator;

pub use agent::{initialize, Agent, AgentHandle, AgentState};
pub use config::{ExporterBackend, ExporterConfig};
pub use error::{Result, ShimError};
