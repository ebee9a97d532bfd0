//! CLI and shutdown integration tests.
//!
//! Tests:
//! - CLI help output lists the telemetry and listener options
//! - SIGTERM drains the server and exits with status 0, even when the
//!   collector is unreachable

mod common;

use std::process::Command;
use std::time::Duration;

const BIN: &str = env!("CARGO_BIN_EXE_otel-shim");

#[test]
fn test_cli_help_output() {
    let output = Command::new(BIN)
        .arg("--help")
        .output()
        .expect("failed to run");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for option in ["--port", "--service-name", "--otel-endpoint", "--backend"] {
        assert!(stdout.contains(option), "help should mention {option}");
    }
}

/// A local port that is free right now.
fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    listener.local_addr().expect("no local addr").port()
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sigterm_exits_cleanly() {
    use std::process::Stdio;
    use tokio::process::Command as TokioCommand;
    use tokio::time::timeout;

    let collector = common::closed_endpoint().await;
    let port = free_port();

    let mut child = TokioCommand::new(BIN)
        .env_clear()
        .env("SIM_HOST", "127.0.0.1")
        .env("SIM_PORT", port.to_string())
        .env("OTEL_SERVICE_NAME", "otel-shim-cli-test")
        .env("OTEL_EXPORTER_OTLP_ENDPOINT", collector.as_str())
        .env("OTEL_SHIM_STARTUP_TIMEOUT_MS", "200")
        .env("OTEL_SHIM_SHUTDOWN_TIMEOUT_MS", "1000")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("failed to spawn otel-shim");

    let listening = common::wait_for(Duration::from_secs(10), || {
        std::net::TcpStream::connect(("127.0.0.1", port)).is_ok()
    })
    .await;
    assert!(listening, "server never started listening on {port}");

    let pid = child.id().expect("no pid");
    let kill = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status()
        .expect("failed to run kill");
    assert!(kill.success());

    let status = match timeout(Duration::from_secs(10), child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => panic!("failed to wait for child: {e}"),
        Err(_) => {
            child.kill().await.expect("failed to kill");
            panic!("server did not respond to SIGTERM within timeout");
        }
    };
    assert_eq!(status.code(), Some(0), "unexpected exit: {status}");
}
