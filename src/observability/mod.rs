//! Process-level observability.
//!
//! Provides:
//! - Structured logging via `tracing-subscriber`
//! - A bridge exporting `tracing` spans through the agent's pipeline
//! - W3C Trace Context extraction for incoming requests

pub mod propagation;
pub mod tracing;
