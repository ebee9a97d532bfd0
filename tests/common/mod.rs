//! Test utilities for otel-shim integration tests.
//!
//! Provides:
//! - A fake collector that accepts TCP connections and never answers
//! - Exporter configuration fixtures
//! - Polling helpers

#![allow(dead_code)]

use std::time::Duration;

use otel_shim::config::ExporterConfig;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use url::Url;

/// A listener standing in for a collector.
///
/// Connections are accepted and held open without a reply, which is enough
/// for the start probe and keeps exports hanging until their timeout.
pub struct FakeCollector {
    pub endpoint: Url,
    task: JoinHandle<()>,
}

impl FakeCollector {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind fake collector");
        let port = listener.local_addr().expect("no local addr").port();
        let endpoint = Url::parse(&format!("http://127.0.0.1:{port}")).expect("invalid url");

        let task = tokio::spawn(async move {
            let mut held: Vec<TcpStream> = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        Self { endpoint, task }
    }
}

impl Drop for FakeCollector {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// An endpoint on a local port nobody listens on.
pub async fn closed_endpoint() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    let port = listener.local_addr().expect("no local addr").port();
    drop(listener);
    Url::parse(&format!("http://127.0.0.1:{port}")).expect("invalid url")
}

/// Exporter configuration with short timeouts for tests.
pub fn exporter_config(endpoint: Url) -> ExporterConfig {
    let mut config = ExporterConfig::new("otel-shim-test", endpoint);
    config.service_namespace = Some("tests".into());
    config.auto_detect_resources = false;
    config.startup_timeout = Duration::from_secs(2);
    config.export_timeout = Duration::from_millis(300);
    config
}

/// Wait for a condition to become true with timeout.
///
/// # Returns
///
/// `true` if condition was met, `false` if timeout expired
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
