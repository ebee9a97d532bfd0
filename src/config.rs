//! Configuration parsing for the shim and the request simulator.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides (the standard `OTEL_*` names)
//! - Sensible defaults for quick start

use clap::{Args, Parser, ValueEnum};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::error::{Result, ShimError};

/// otel-shim: OpenTelemetry tracing bootstrap with a latency-simulating demo server.
#[derive(Parser, Debug, Clone)]
#[command(name = "otel-shim")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "SIM_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "SIM_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "OTEL_SHIM_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Upper bound on flushing and stopping the pipeline at exit, in milliseconds
    #[arg(long, env = "OTEL_SHIM_SHUTDOWN_TIMEOUT_MS", default_value_t = 5000)]
    pub shutdown_timeout_ms: u64,

    #[command(flatten)]
    pub telemetry: TelemetryArgs,

    #[command(flatten)]
    pub simulator: SimulatorArgs,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Create a default configuration for testing.
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0, // Random port
            log_level: "debug".into(),
            shutdown_timeout_ms: 500,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            log_level: "info".into(),
            log_format: LogFormat::Text,
            shutdown_timeout_ms: 5000,
            telemetry: TelemetryArgs::default(),
            simulator: SimulatorArgs::default(),
        }
    }
}

/// Log output format.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Exporter backend the agent sends spans through.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExporterBackend {
    /// OTLP over gRPC (tonic).
    #[default]
    OtlpGrpc,
    /// OTLP over HTTP with protobuf payloads.
    OtlpHttp,
    /// Vendor tracing agent: OTLP/HTTP with a mandatory bearer token.
    Vendor,
}

impl ExporterBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OtlpGrpc => "otlp-grpc",
            Self::OtlpHttp => "otlp-http",
            Self::Vendor => "vendor",
        }
    }
}

impl FromStr for ExporterBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

impl fmt::Display for ExporterBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Raw telemetry settings as read from flags and the environment. Validation
// happens in `exporter_config`, so a bad value disables instrumentation
// instead of aborting the process.
#[derive(Parser, Clone, Default)]
pub struct TelemetryArgs {
    /// Logical service identifier
    #[arg(long, env = "OTEL_SERVICE_NAME")]
    pub service_name: Option<String>,

    /// Service grouping identifier
    #[arg(long, env = "OTEL_SERVICE_NAMESPACE")]
    pub service_namespace: Option<String>,

    /// OpenTelemetry collector endpoint
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,

    /// Bearer token for authenticated collectors
    #[arg(long, env = "OTEL_SHIM_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Exporter backend: otlp-grpc (default), otlp-http or vendor
    #[arg(long, env = "OTEL_SHIM_BACKEND")]
    pub backend: Option<String>,

    /// Extra exporter headers as comma-separated key=value pairs
    #[arg(long, env = "OTEL_EXPORTER_OTLP_HEADERS", hide_env_values = true)]
    pub otel_headers: Option<String>,

    /// Merge SDK and OTEL_RESOURCE_ATTRIBUTES resource detection (default true)
    #[arg(long, env = "OTEL_SHIM_AUTO_DETECT_RESOURCES")]
    pub auto_detect_resources: Option<String>,

    /// Bound on the asynchronous start probe, in milliseconds (default 5000)
    #[arg(long, env = "OTEL_SHIM_STARTUP_TIMEOUT_MS")]
    pub startup_timeout_ms: Option<String>,

    /// Exporter request timeout, in milliseconds (default 10000)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_TIMEOUT")]
    pub export_timeout_ms: Option<String>,

    /// Maximum number of spans buffered by the batching processor (default 2048)
    #[arg(long, env = "OTEL_BSP_MAX_QUEUE_SIZE")]
    pub max_queue_size: Option<String>,

    /// Delay between batch exports, in milliseconds (default 5000)
    #[arg(long, env = "OTEL_BSP_SCHEDULE_DELAY")]
    pub scheduled_delay_ms: Option<String>,

    /// Maximum number of spans per export (default 512)
    #[arg(long, env = "OTEL_BSP_MAX_EXPORT_BATCH_SIZE")]
    pub max_export_batch_size: Option<String>,
}

// Hand-written so the token and headers never reach the logs.
impl fmt::Debug for TelemetryArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryArgs")
            .field("service_name", &self.service_name)
            .field("service_namespace", &self.service_namespace)
            .field("otel_endpoint", &self.otel_endpoint)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("backend", &self.backend)
            .field("otel_headers", &self.otel_headers.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl TelemetryArgs {
    /// Read telemetry settings from the process environment only.
    pub fn from_env() -> std::result::Result<Self, clap::Error> {
        Self::try_parse_from(["otel-shim"])
    }

    /// Validate the raw settings into an [`ExporterConfig`].
    pub fn exporter_config(&self) -> Result<ExporterConfig> {
        let service_name = self
            .service_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ShimError::MissingServiceName)?
            .to_string();

        let endpoint = self
            .otel_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ShimError::MissingEndpoint)?;
        let collector_endpoint = parse_endpoint(endpoint)?;

        let backend = setting(
            "OTEL_SHIM_BACKEND",
            self.backend.as_deref(),
            ExporterBackend::default(),
        )?;
        let auth_token = self.auth_token.clone().filter(|t| !t.is_empty());
        if backend == ExporterBackend::Vendor && auth_token.is_none() {
            return Err(ShimError::MissingAuthToken {
                backend: backend.as_str(),
            });
        }

        let headers = match self.otel_headers.as_deref() {
            Some(raw) => parse_headers(raw)?,
            None => Vec::new(),
        };
        let defaults = BatchSettings::default();

        Ok(ExporterConfig {
            service_name,
            service_namespace: self
                .service_namespace
                .clone()
                .filter(|s| !s.trim().is_empty()),
            collector_endpoint,
            auth_token,
            backend,
            headers,
            auto_detect_resources: switch(
                "OTEL_SHIM_AUTO_DETECT_RESOURCES",
                self.auto_detect_resources.as_deref(),
                true,
            )?,
            batch: BatchSettings {
                max_queue_size: setting(
                    "OTEL_BSP_MAX_QUEUE_SIZE",
                    self.max_queue_size.as_deref(),
                    defaults.max_queue_size,
                )?,
                scheduled_delay: millis(
                    "OTEL_BSP_SCHEDULE_DELAY",
                    self.scheduled_delay_ms.as_deref(),
                    defaults.scheduled_delay,
                )?,
                max_export_batch_size: setting(
                    "OTEL_BSP_MAX_EXPORT_BATCH_SIZE",
                    self.max_export_batch_size.as_deref(),
                    defaults.max_export_batch_size,
                )?,
            },
            startup_timeout: millis(
                "OTEL_SHIM_STARTUP_TIMEOUT_MS",
                self.startup_timeout_ms.as_deref(),
                DEFAULT_STARTUP_TIMEOUT,
            )?,
            export_timeout: millis(
                "OTEL_EXPORTER_OTLP_TIMEOUT",
                self.export_timeout_ms.as_deref(),
                DEFAULT_EXPORT_TIMEOUT,
            )?,
        })
    }
}

const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Parse an optional raw setting, falling back to `default` when unset or blank.
fn setting<T: FromStr>(name: &'static str, raw: Option<&str>, default: T) -> Result<T> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ShimError::InvalidSetting {
            name,
            value: value.to_string(),
        }),
    }
}

fn millis(name: &'static str, raw: Option<&str>, default: Duration) -> Result<Duration> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    setting(name, raw, default_ms).map(Duration::from_millis)
}

fn switch(name: &'static str, raw: Option<&str>, default: bool) -> Result<bool> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ShimError::InvalidSetting {
                name,
                value: value.to_string(),
            }),
        },
    }
}

/// Request simulator route timings.
#[derive(Args, Debug, Clone)]
pub struct SimulatorArgs {
    /// Base delay of GET /api/search, in milliseconds
    #[arg(long, env = "SIM_SEARCH_DELAY_MS", default_value_t = 500)]
    pub search_delay_ms: u64,

    /// Base delay of GET /api/tool, in milliseconds
    #[arg(long, env = "SIM_TOOL_DELAY_MS", default_value_t = 1000)]
    pub tool_delay_ms: u64,

    /// Base delay of GET /api/delete/{id}/now, in milliseconds
    #[arg(long, env = "SIM_DELETE_DELAY_MS", default_value_t = 1000)]
    pub delete_delay_ms: u64,

    /// Total jitter spread as a percentage of the base delay
    #[arg(long, env = "SIM_JITTER_PCT", default_value_t = 20)]
    pub jitter_pct: u32,
}

impl Default for SimulatorArgs {
    fn default() -> Self {
        Self {
            search_delay_ms: 500,
            tool_delay_ms: 1000,
            delete_delay_ms: 1000,
            jitter_pct: 20,
        }
    }
}

/// Batching processor settings handed to the SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSettings {
    pub max_queue_size: usize,
    pub scheduled_delay: Duration,
    pub max_export_batch_size: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 2048,
            scheduled_delay: Duration::from_secs(5),
            max_export_batch_size: 512,
        }
    }
}

/// Validated exporter configuration.
///
/// Built once at startup and owned by the agent; never mutated afterwards.
#[derive(Clone)]
pub struct ExporterConfig {
    pub service_name: String,
    pub service_namespace: Option<String>,
    pub collector_endpoint: Url,
    pub auth_token: Option<String>,
    pub backend: ExporterBackend,
    pub headers: Vec<(String, String)>,
    pub auto_detect_resources: bool,
    pub batch: BatchSettings,
    pub startup_timeout: Duration,
    pub export_timeout: Duration,
}

impl ExporterConfig {
    /// Minimal configuration with defaults for everything but the service
    /// name and the collector endpoint.
    pub fn new(service_name: impl Into<String>, collector_endpoint: Url) -> Self {
        Self {
            service_name: service_name.into(),
            service_namespace: None,
            collector_endpoint,
            auth_token: None,
            backend: ExporterBackend::default(),
            headers: Vec::new(),
            auto_detect_resources: true,
            batch: BatchSettings::default(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
        }
    }

    /// Read and validate the exporter configuration from the environment.
    pub fn from_env() -> Result<Self> {
        TelemetryArgs::from_env()?.exporter_config()
    }

    /// Headers sent with every export: the bearer token first, then the
    /// user-supplied pairs.
    pub fn export_headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::with_capacity(self.headers.len() + 1);
        if let Some(token) = &self.auth_token {
            headers.push(("authorization".to_string(), format!("Bearer {token}")));
        }
        headers.extend(self.headers.iter().cloned());
        headers
    }
}

impl fmt::Debug for ExporterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterConfig")
            .field("service_name", &self.service_name)
            .field("service_namespace", &self.service_namespace)
            .field("collector_endpoint", &self.collector_endpoint.as_str())
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("backend", &self.backend)
            .field("headers", &self.headers.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("auto_detect_resources", &self.auto_detect_resources)
            .field("batch", &self.batch)
            .field("startup_timeout", &self.startup_timeout)
            .field("export_timeout", &self.export_timeout)
            .finish()
    }
}

/// Parse a collector URL. Only absolute `http`/`https` URLs with a host are
/// accepted; gRPC collectors use `http` too.
pub fn parse_endpoint(raw: &str) -> Result<Url> {
    let invalid = |reason: String| ShimError::InvalidEndpoint {
        endpoint: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Parse `OTEL_EXPORTER_OTLP_HEADERS`-style `k=v,k2=v2` lists.
pub fn parse_headers(raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| ShimError::InvalidHeader(pair.to_string()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ShimError::InvalidHeader(pair.to_string()));
            }
            Ok((key.to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}
