//! Agent bootstrap: owns the tracing pipeline from construction to shutdown.
//!
//! Lifecycle:
//!
//! ```text
//! Uninitialized -> Starting -> Running -> Stopping -> Stopped
//!                     |                     ^
//!                     +------> Failed ------+
//! ```
//!
//! `Starting -> Running` happens on a background task so the caller is never
//! blocked by a slow or missing collector. Every failure is logged and leaves
//! the host application running without instrumentation.

pub mod pipeline;
pub mod probe;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use crate::config::{ExporterConfig, TelemetryArgs};
use crate::error::{Result, ShimError};

/// Instrumentation scope name for spans bridged from `tracing`.
pub const TRACER_NAME: &str = env!("CARGO_PKG_NAME");

/// Pipeline lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Uninitialized,
    Starting,
    Running,
    Stopping,
    Stopped,
    /// Initialization did not complete; spans are not exported.
    Failed,
}

impl AgentState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build an agent for `config` and start it.
///
/// Never fails: a pipeline that cannot be built or a collector that cannot be
/// reached is logged and reflected as [`AgentState::Failed`] on the handle.
/// Must be called from within a Tokio runtime.
pub fn initialize(config: ExporterConfig) -> AgentHandle {
    Agent::new(config).start()
}

/// A constructed but not yet started pipeline.
///
/// Splitting construction from [`Agent::start`] lets the caller install the
/// `tracing` bridge (see [`Agent::tracer`]) before any startup outcome is
/// logged.
pub struct Agent {
    pipeline: std::result::Result<Pipeline, ShimError>,
    state: watch::Sender<AgentState>,
}

struct Pipeline {
    provider: TracerProvider,
    tracer: Tracer,
    endpoint: Url,
    startup_timeout: Duration,
}

impl Agent {
    /// Construct the exporter, batching processor and tracer provider.
    ///
    /// No network I/O is performed. Must be called from within a Tokio
    /// runtime.
    pub fn new(config: ExporterConfig) -> Self {
        let pipeline = pipeline::build_provider(&config).map(|provider| Pipeline {
            tracer: provider.tracer(TRACER_NAME),
            provider,
            endpoint: config.collector_endpoint.clone(),
            startup_timeout: config.startup_timeout,
        });
        Self::with_pipeline(pipeline)
    }

    /// Validate raw telemetry settings and construct the pipeline. Invalid
    /// settings yield a [`Agent::disabled`] agent carrying the error.
    pub fn from_settings(settings: &TelemetryArgs) -> Self {
        match settings.exporter_config() {
            Ok(config) => Self::new(config),
            Err(error) => Self::disabled(error),
        }
    }

    /// An agent whose configuration could not be built. Starting it yields a
    /// handle in [`AgentState::Failed`].
    pub fn disabled(error: ShimError) -> Self {
        Self::with_pipeline(Err(error))
    }

    fn with_pipeline(pipeline: std::result::Result<Pipeline, ShimError>) -> Self {
        let (state, _) = watch::channel(AgentState::Uninitialized);
        Self { pipeline, state }
    }

    pub fn state(&self) -> AgentState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions, including the ones made by [`Agent::start`].
    pub fn subscribe(&self) -> watch::Receiver<AgentState> {
        self.state.subscribe()
    }

    /// Tracer to bridge `tracing` spans into the pipeline, if one was built.
    pub fn tracer(&self) -> Option<Tracer> {
        self.pipeline.as_ref().ok().map(|p| p.tracer.clone())
    }

    /// Move to `Starting` and spawn the asynchronous start task.
    pub fn start(self) -> AgentHandle {
        let inner = Arc::new(Inner {
            state: self.state,
            provider: Mutex::new(None),
            last_error: Mutex::new(None),
        });
        inner.set(AgentState::Starting);

        match self.pipeline {
            Ok(pipeline) => {
                opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());
                *lock(&inner.provider) = Some(pipeline.provider);

                let startup = tokio::spawn(run_startup(
                    Arc::clone(&inner),
                    pipeline.endpoint,
                    pipeline.startup_timeout,
                ));
                AgentHandle {
                    inner,
                    tracer: Some(pipeline.tracer),
                    startup: Mutex::new(Some(startup)),
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "Error initializing tracing, continuing uninstrumented");
                inner.record_error(&error);
                inner.set(AgentState::Failed);
                AgentHandle {
                    inner,
                    tracer: None,
                    startup: Mutex::new(None),
                }
            }
        }
    }
}

/// Explicitly owned handle to a started pipeline.
pub struct AgentHandle {
    inner: Arc<Inner>,
    tracer: Option<Tracer>,
    startup: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    state: watch::Sender<AgentState>,
    provider: Mutex<Option<TracerProvider>>,
    last_error: Mutex<Option<String>>,
}

impl Inner {
    fn state(&self) -> AgentState {
        *self.state.borrow()
    }

    fn set(&self, next: AgentState) {
        self.state.send_modify(|state| {
            tracing::debug!(from = %state, to = %next, "Agent state transition");
            *state = next;
        });
    }

    /// Move to `next` only if the current state is one of `from`.
    fn transition(&self, from: &[AgentState], next: AgentState) -> bool {
        self.state.send_if_modified(|state| {
            if from.contains(state) {
                tracing::debug!(from = %state, to = %next, "Agent state transition");
                *state = next;
                true
            } else {
                false
            }
        })
    }

    fn take_provider(&self) -> Option<TracerProvider> {
        lock(&self.provider).take()
    }

    fn record_error(&self, error: &ShimError) {
        *lock(&self.last_error) = Some(error.to_string());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_startup(inner: Arc<Inner>, endpoint: Url, timeout: Duration) {
    match probe::probe_collector(&endpoint, timeout).await {
        Ok(()) => {
            if inner.transition(&[AgentState::Starting], AgentState::Running) {
                tracing::info!(endpoint = %endpoint, "Tracing initialized");
            }
        }
        Err(error) => {
            tracing::warn!(error = %error, "Error initializing tracing, continuing uninstrumented");
            inner.record_error(&error);
            if inner.transition(&[AgentState::Starting], AgentState::Failed) {
                if let Some(provider) = inner.take_provider() {
                    // Provider shutdown blocks on the batch task.
                    tokio::task::spawn_blocking(move || {
                        if let Err(e) = provider.shutdown() {
                            tracing::debug!(error = %e, "Discarding failed pipeline");
                        }
                    });
                }
            }
        }
    }
}

impl AgentHandle {
    pub fn state(&self) -> AgentState {
        self.inner.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<AgentState> {
        self.inner.state.subscribe()
    }

    /// Wait until the start task has settled and return the resulting state.
    pub async fn ready(&self) -> AgentState {
        let mut rx = self.subscribe();
        let settled = match rx.wait_for(|state| *state != AgentState::Starting).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        settled
    }

    pub fn tracer(&self) -> Option<Tracer> {
        self.tracer.clone()
    }

    /// Message of the error that made initialization fail, if any.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.inner.last_error).clone()
    }

    /// Flush buffered spans and stop the pipeline, waiting at most `timeout`.
    ///
    /// Always ends in [`AgentState::Stopped`]. A second call is a no-op that
    /// returns `Ok(())`. Errors are logged and returned for the caller to
    /// inspect; they are never meant to change the process exit status.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        let stopping = self.inner.transition(
            &[
                AgentState::Starting,
                AgentState::Running,
                AgentState::Failed,
            ],
            AgentState::Stopping,
        );
        if !stopping {
            tracing::debug!(state = %self.state(), "Tracing already shut down");
            return Ok(());
        }

        if let Some(startup) = lock(&self.startup).take() {
            startup.abort();
        }

        let result = match self.inner.take_provider() {
            Some(provider) => {
                let flush = tokio::task::spawn_blocking(move || flush_and_stop(provider));
                match tokio::time::timeout(timeout, flush).await {
                    Ok(joined) => joined.map_err(ShimError::from).and_then(|r| r),
                    Err(_) => Err(ShimError::ShutdownTimeout(timeout)),
                }
            }
            None => Ok(()),
        };

        self.inner.set(AgentState::Stopped);
        match &result {
            Ok(()) => tracing::info!("Tracing terminated"),
            Err(e) => tracing::warn!(error = %e, "Error terminating tracing"),
        }
        result
    }
}

fn flush_and_stop(provider: TracerProvider) -> Result<()> {
    for result in provider.force_flush() {
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to flush buffered spans");
        }
    }
    provider.shutdown()?;
    Ok(())
}

impl fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentHandle")
            .field("state", &self.state())
            .field("instrumented", &self.tracer.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(AgentState::Uninitialized.to_string(), "uninitialized");
        assert_eq!(AgentState::Stopped.to_string(), "stopped");
    }

    #[tokio::test]
    async fn test_disabled_agent_fails_without_panicking() {
        let agent = Agent::disabled(ShimError::MissingServiceName);
        assert_eq!(agent.state(), AgentState::Uninitialized);
        assert!(agent.tracer().is_none());

        let handle = agent.start();
        assert_eq!(handle.state(), AgentState::Failed);
        assert_eq!(handle.ready().await, AgentState::Failed);
        assert!(handle
            .last_error()
            .unwrap()
            .contains("OTEL_SERVICE_NAME"));

        handle.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(handle.state(), AgentState::Stopped);
    }

    #[tokio::test]
    async fn test_transition_requires_expected_state() {
        let (state, _) = watch::channel(AgentState::Running);
        let inner = Inner {
            state,
            provider: Mutex::new(None),
            last_error: Mutex::new(None),
        };
        assert!(!inner.transition(&[AgentState::Starting], AgentState::Failed));
        assert_eq!(inner.state(), AgentState::Running);
        assert!(inner.transition(&[AgentState::Running], AgentState::Stopping));
        assert_eq!(inner.state(), AgentState::Stopping);
    }
}
