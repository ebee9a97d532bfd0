//! Collector reachability probe run while the agent is starting.

use std::time::Duration;

use tokio::net::TcpStream;
use url::{Host, Url};

use crate::error::{Result, ShimError};

/// Default OTLP/gRPC port, used when the URL carries neither a port nor a
/// scheme with a known default.
const DEFAULT_COLLECTOR_PORT: u16 = 4317;

/// Open (and immediately drop) a TCP connection to the collector behind
/// `endpoint`, bounded by `timeout`.
pub async fn probe_collector(endpoint: &Url, timeout: Duration) -> Result<()> {
    let host = match endpoint.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        None => {
            return Err(ShimError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: "missing host".to_string(),
            })
        }
    };
    let port = endpoint
        .port_or_known_default()
        .unwrap_or(DEFAULT_COLLECTOR_PORT);

    match tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port))).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(source)) => Err(ShimError::Unreachable {
            endpoint: endpoint.to_string(),
            source,
        }),
        Err(_) => Err(ShimError::StartupTimeout {
            endpoint: endpoint.to_string(),
            timeout,
        }),
    }
}
