//! Structured JSON logging for the gateway.
//!
//! One JSON object per event with target, file and line. Events raised while
//! serving a request carry the request span (`service`, `version`, `method`,
//! `path`) so log lines can be grouped per request without logging bodies or
//! query strings.

use std::io;

use axum::http::Request;
use tracing::{Span, Subscriber};
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Service name attached to request spans.
pub const SERVICE_NAME: &str = "pizzeria-api";

/// Targets emitted by the gateway crates, including the per-subsystem
/// `target:` strings used by the libraries.
const GATEWAY_TARGETS: &[&str] = &[
    "pizzeria_api",
    "pizzeria_resilience",
    "pizzeria_webhooks",
    "assistant",
    "circuit_breaker",
    "llm_client",
    "llm_invoker",
    "response_cache",
    "webhook_gate",
    "webhook_sink",
    "tower_http",
];

/// Expand a configured filter into `EnvFilter` directives.
///
/// A bare level (`info`, `debug`, ...) applies to the gateway targets while
/// dependencies such as hyper and reqwest stay at `warn` or quieter. Anything
/// else is taken as a full directive list.
pub fn filter_directives(filter: &str) -> String {
    let filter = filter.trim();
    let Ok(level) = filter.parse::<LevelFilter>() else {
        return filter.to_string();
    };

    let dependencies = level.min(LevelFilter::WARN).to_string().to_lowercase();
    let level = level.to_string().to_lowercase();
    std::iter::once(dependencies)
        .chain(GATEWAY_TARGETS.iter().map(|target| format!("{target}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Span opened by the HTTP trace layer for each request.
pub fn request_span<B>(request: &Request<B>) -> Span {
    tracing::info_span!(
        "http_request",
        service = SERVICE_NAME,
        version = env!("CARGO_PKG_VERSION"),
        method = %request.method(),
        path = %request.uri().path(),
    )
}

fn json_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .json()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_current_span(true)
        .with_span_list(false)
        .flatten_event(true)
        .with_writer(writer)
}

/// Initialize the global subscriber with JSON output on stdout.
///
/// `filter` is the configured `RUST_LOG` value; see [`filter_directives`].
/// Exits the process if the directives do not parse.
///
/// # Panics
///
/// Panics if the subscriber has already been initialized.
pub fn init_logging(filter: &str) {
    let directives = filter_directives(filter);
    let filter_layer = match EnvFilter::try_new(&directives) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("FATAL: Invalid RUST_LOG '{filter}': {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::registry()
        .with(json_layer(io::stdout))
        .with(filter_layer)
        .init();

    tracing::info!(service = SERVICE_NAME, filter = %directives, "Logging initialized");
}

/// Initialize logging for tests (with simpler output).
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(filter_directives("debug"))
        .try_init();
}
