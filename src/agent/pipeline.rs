//! Exporter and tracer provider construction.
//!
//! Everything here is plain SDK wiring: pick the OTLP transport for the
//! configured backend, wrap it in a batching processor, and tag the provider
//! with the service resource.

use std::collections::HashMap;

use opentelemetry::KeyValue;
use opentelemetry_otlp::{Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::{
    BatchConfig, BatchConfigBuilder, BatchSpanProcessor, Config as TraceConfig, TracerProvider,
};
use opentelemetry_sdk::Resource;
use tonic::metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue};
use tonic::transport::ClientTlsConfig;
use url::Url;

use crate::config::{ExporterBackend, ExporterConfig};
use crate::error::{Result, ShimError};

pub const SERVICE_NAME: &str = "service.name";
pub const SERVICE_NAMESPACE: &str = "service.namespace";

/// Path OTLP/HTTP collectors accept spans on.
pub const TRACES_PATH: &str = "/v1/traces";

/// Build the tracer provider for `config`.
///
/// Must be called from within a Tokio runtime: the batching processor spawns
/// its export task immediately, and the gRPC channel is created lazily on it.
/// No network I/O happens here.
pub fn build_provider(config: &ExporterConfig) -> Result<TracerProvider> {
    let exporter = build_exporter(config)?;

    let processor = BatchSpanProcessor::builder(exporter, runtime::Tokio)
        .with_batch_config(batch_config(config))
        .build();

    Ok(TracerProvider::builder()
        .with_span_processor(processor)
        .with_config(TraceConfig::default().with_resource(build_resource(config)))
        .build())
}

fn batch_config(config: &ExporterConfig) -> BatchConfig {
    BatchConfigBuilder::default()
        .with_max_queue_size(config.batch.max_queue_size)
        .with_scheduled_delay(config.batch.scheduled_delay)
        .with_max_export_batch_size(config.batch.max_export_batch_size)
        .with_max_export_timeout(config.export_timeout)
        .build()
}

fn build_exporter(config: &ExporterConfig) -> Result<SpanExporter> {
    let headers = config.export_headers();

    let exporter = match config.backend {
        ExporterBackend::OtlpGrpc => {
            let mut builder = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(config.collector_endpoint.as_str())
                .with_protocol(Protocol::Grpc)
                .with_timeout(config.export_timeout)
                .with_metadata(grpc_metadata(&headers)?);
            if let Some(tls) = grpc_tls_config(&config.collector_endpoint) {
                builder = builder.with_tls_config(tls);
            }
            builder.build_span_exporter()?
        }
        ExporterBackend::OtlpHttp | ExporterBackend::Vendor => opentelemetry_otlp::new_exporter()
            .http()
            .with_endpoint(traces_url(&config.collector_endpoint))
            .with_protocol(Protocol::HttpBinary)
            .with_timeout(config.export_timeout)
            .with_headers(headers.into_iter().collect::<HashMap<_, _>>())
            .build_span_exporter()?,
    };

    tracing::debug!(
        backend = %config.backend,
        endpoint = %config.collector_endpoint,
        "Span exporter configured"
    );
    Ok(exporter)
}

/// Convert header pairs into gRPC metadata.
pub fn grpc_metadata(headers: &[(String, String)]) -> Result<MetadataMap> {
    let mut metadata = MetadataMap::with_capacity(headers.len());
    for (key, value) in headers {
        let name = MetadataKey::<Ascii>::from_bytes(key.as_bytes())
            .map_err(|_| ShimError::InvalidHeader(key.clone()))?;
        let value = value
            .parse::<MetadataValue<Ascii>>()
            .map_err(|_| ShimError::InvalidHeader(key.clone()))?;
        metadata.insert(name, value);
    }
    Ok(metadata)
}

/// TLS settings for an `https` gRPC collector, trusting the bundled web PKI
/// roots. Plain `http` endpoints stay cleartext.
pub fn grpc_tls_config(endpoint: &Url) -> Option<ClientTlsConfig> {
    (endpoint.scheme() == "https").then(|| ClientTlsConfig::new().with_webpki_roots())
}

/// Resource tagging every exported span.
///
/// Explicit service attributes win over anything the SDK detects.
pub fn build_resource(config: &ExporterConfig) -> Resource {
    let mut attributes = vec![KeyValue::new(SERVICE_NAME, config.service_name.clone())];
    if let Some(namespace) = &config.service_namespace {
        attributes.push(KeyValue::new(SERVICE_NAMESPACE, namespace.clone()));
    }
    let explicit = Resource::new(attributes);

    if config.auto_detect_resources {
        Resource::default().merge(&explicit)
    } else {
        explicit
    }
}

/// Full OTLP/HTTP traces URL for a collector base URL.
pub fn traces_url(endpoint: &Url) -> String {
    let mut url = endpoint.clone();
    if !url.path().ends_with(TRACES_PATH) {
        let path = format!("{}{}", url.path().trim_end_matches('/'), TRACES_PATH);
        url.set_path(&path);
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::{Key, Value};

    fn config(endpoint: &str) -> ExporterConfig {
        ExporterConfig::new("checkout", Url::parse(endpoint).unwrap())
    }

    #[test]
    fn test_traces_url_appends_path() {
        let url = Url::parse("http://collector:4318").unwrap();
        assert_eq!(traces_url(&url), "http://collector:4318/v1/traces");

        let url = Url::parse("http://collector:4318/otlp/").unwrap();
        assert_eq!(traces_url(&url), "http://collector:4318/otlp/v1/traces");
    }

    #[test]
    fn test_traces_url_keeps_existing_path() {
        let url = Url::parse("http://localhost:4318/v1/traces").unwrap();
        assert_eq!(traces_url(&url), "http://localhost:4318/v1/traces");
    }

    #[test]
    fn test_resource_carries_service_attributes() {
        let mut config = config("http://localhost:4317");
        config.service_namespace = Some("shop".into());
        config.auto_detect_resources = false;

        let resource = build_resource(&config);
        assert_eq!(
            resource.get(Key::new(SERVICE_NAME)),
            Some(Value::from("checkout"))
        );
        assert_eq!(
            resource.get(Key::new(SERVICE_NAMESPACE)),
            Some(Value::from("shop"))
        );
        assert_eq!(resource.len(), 2);
    }

    #[test]
    fn test_explicit_service_name_wins_over_detection() {
        let config = config("http://localhost:4317");
        let resource = build_resource(&config);
        assert_eq!(
            resource.get(Key::new(SERVICE_NAME)),
            Some(Value::from("checkout"))
        );
        // SDK detection adds telemetry.sdk.* on top.
        assert!(resource.len() > 1);
    }

    #[test]
    fn test_grpc_metadata_from_headers() {
        let headers = vec![
            ("authorization".to_string(), "Bearer abc".to_string()),
            ("x-team".to_string(), "core".to_string()),
        ];
        let metadata = grpc_metadata(&headers).unwrap();
        assert_eq!(metadata.get("authorization").unwrap(), "Bearer abc");
        assert_eq!(metadata.get("x-team").unwrap(), "core");
    }

    #[test]
    fn test_grpc_metadata_rejects_invalid_key() {
        let headers = vec![("bad key".to_string(), "v".to_string())];
        assert!(matches!(
            grpc_metadata(&headers),
            Err(ShimError::InvalidHeader(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_build_provider_for_every_backend() {
        for backend in [
            ExporterBackend::OtlpGrpc,
            ExporterBackend::OtlpHttp,
            ExporterBackend::Vendor,
        ] {
            let mut config = config("http://127.0.0.1:4317");
            config.backend = backend;
            config.auth_token = Some("token".into());
            let provider = build_provider(&config).expect("provider should build");
            provider.shutdown().expect("shutdown should succeed");
        }
    }

    #[test]
    fn test_grpc_tls_only_for_https() {
        let secure = Url::parse("https://ingest.example.com:443").unwrap();
        assert!(grpc_tls_config(&secure).is_some());

        let plain = Url::parse("http://127.0.0.1:4317").unwrap();
        assert!(grpc_tls_config(&plain).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_build_provider_for_https_collectors() {
        for backend in [
            ExporterBackend::OtlpGrpc,
            ExporterBackend::OtlpHttp,
            ExporterBackend::Vendor,
        ] {
            let mut config = config("https://ingest.example.com");
            config.backend = backend;
            config.auth_token = Some("token".into());
            let provider = build_provider(&config).expect("TLS provider should build");
            provider.shutdown().expect("shutdown should succeed");
        }
    }
}
