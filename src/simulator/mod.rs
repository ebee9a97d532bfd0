//! Demo request simulator.
//!
//! A handful of routes that answer after a jittered delay so instrumented
//! traffic shows varied timings:
//! - `GET /` - immediate acknowledgement
//! - `GET /api/search` - ~500ms
//! - `GET /api/tool` - ~1000ms
//! - `GET /api/delete/{id}/now` - ~1000ms, `{id}` ignored

pub mod jitter;

use axum::extract::{MatchedPath, Request, State};
use axum::routing::get;
use axum::Router;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{Level, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::config::SimulatorArgs;
use crate::observability::propagation::extract_context;
pub use jitter::Jitter;

pub const ROOT_BODY: &str = "Hello World!";
pub const SEARCH_BODY: &str = "Hello API!";
pub const TOOL_BODY: &str = "Hello Tool!";
pub const DELETE_BODY: &str = "Hello delete!";

/// Delay profile of every simulated route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTable {
    pub search: Jitter,
    pub tool: Jitter,
    pub delete: Jitter,
}

impl RouteTable {
    pub fn from_args(args: &SimulatorArgs) -> Self {
        Self {
            search: Jitter::from_millis(args.search_delay_ms, args.jitter_pct),
            tool: Jitter::from_millis(args.tool_delay_ms, args.jitter_pct),
            delete: Jitter::from_millis(args.delete_delay_ms, args.jitter_pct),
        }
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::from_args(&SimulatorArgs::default())
    }
}

/// Create the simulator router.
pub fn create_router(routes: RouteTable) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/api/search", get(search_handler))
        .route("/api/tool", get(tool_handler))
        .route("/api/delete/:id/now", get(delete_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(make_request_span)
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(routes)
}

/// One server span per request, parented on any incoming `traceparent`.
fn make_request_span(request: &Request) -> Span {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path().to_owned(), |p| p.as_str().to_owned());

    let span = tracing::info_span!(
        "request",
        otel.name = %format!("{} {route}", request.method()),
        otel.kind = "server",
        http.request.method = %request.method(),
        http.route = %route,
        url.path = %request.uri().path(),
    );
    span.set_parent(extract_context(request.headers()));
    span
}

async fn simulate_latency(route: &'static str, jitter: Jitter) {
    let delay = jitter.sample(&mut rand::thread_rng());
    tracing::debug!(route, delay_ms = delay.as_millis() as u64, "Simulating backend latency");
    tokio::time::sleep(delay).await;
}

/// Handle GET / - static acknowledgement.
async fn root_handler() -> &'static str {
    ROOT_BODY
}

/// Handle GET /api/search.
async fn search_handler(State(routes): State<RouteTable>) -> &'static str {
    simulate_latency("search", routes.search).await;
    SEARCH_BODY
}

/// Handle GET /api/tool.
async fn tool_handler(State(routes): State<RouteTable>) -> &'static str {
    simulate_latency("tool", routes.tool).await;
    TOOL_BODY
}

/// Handle GET /api/delete/{id}/now.
async fn delete_handler(State(routes): State<RouteTable>) -> &'static str {
    simulate_latency("delete", routes.delete).await;
    DELETE_BODY
}
