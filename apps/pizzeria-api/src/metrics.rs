//! Prometheus metrics collection and exposition.
//!
//! One [`Registry`] holds the HTTP families defined here plus the outbound
//! LLM and inbound webhook families owned by the library crates. `GET
//! /metrics` encodes it in text exposition format.

use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use pizzeria_resilience::OutboundMetrics;
use pizzeria_webhooks::WebhookMetrics;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::Registry,
};

use crate::state::AppState;

/// Labels for HTTP request metrics: method, route pattern, and status code.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpRequestLabels {
    pub method: String,
    pub route: String,
    pub status: u16,
}

/// HTTP metrics: request counter and duration histogram.
pub struct HttpMetrics {
    pub requests_total: Family<HttpRequestLabels, Counter>,
    pub request_duration_seconds: Family<HttpRequestLabels, Histogram>,
}

impl HttpMetrics {
    fn new() -> Self {
        Self {
            requests_total: Family::default(),
            request_duration_seconds: Family::new_with_constructor(|| {
                Histogram::new(
                    [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
                        .into_iter(),
                )
            }),
        }
    }
}

/// Central metrics registry that owns all metric families.
pub struct MetricsRegistry {
    pub registry: Mutex<Registry>,
    pub http: Arc<HttpMetrics>,
    pub outbound: Arc<OutboundMetrics>,
    pub webhooks: Arc<WebhookMetrics>,
}

impl MetricsRegistry {
    /// Create a new `MetricsRegistry` with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let http = Arc::new(HttpMetrics::new());
        let outbound = Arc::new(OutboundMetrics::new());
        let webhooks = Arc::new(WebhookMetrics::new());

        registry.register(
            "http_requests",
            "Total number of HTTP requests",
            http.requests_total.clone(),
        );
        registry.register(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
            http.request_duration_seconds.clone(),
        );
        outbound.register(&mut registry);
        webhooks.register(&mut registry);

        Self {
            registry: Mutex::new(registry),
            http,
            outbound,
            webhooks,
        }
    }

    /// Encode every registered family.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        prometheus_client::encoding::text::encode(&mut buf, &registry)?;
        Ok(buf)
    }
}

/// Axum middleware that records HTTP request metrics (counter + histogram).
///
/// The `route` label is the matched route pattern, so provider names in the
/// path do not add label values. Unmatched routes use `"unmatched"`.
pub async fn metrics_middleware(
    State(metrics): State<Arc<MetricsRegistry>>,
    matched_path: Option<MatchedPath>,
    request: axum::http::Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let route = matched_path
        .as_ref()
        .map_or_else(|| "unmatched".to_string(), |m| m.as_str().to_string());

    let start = std::time::Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed().as_secs_f64();

    let labels = HttpRequestLabels {
        method,
        route,
        status: response.status().as_u16(),
    };

    metrics.http.requests_total.get_or_create(&labels).inc();
    metrics
        .http
        .request_duration_seconds
        .get_or_create(&labels)
        .observe(duration);

    response
}

/// Handler for `GET /metrics`.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(buf) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            buf,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_includes_library_families() {
        let metrics = MetricsRegistry::new();
        metrics.outbound.record_degraded("circuit_open");
        metrics.webhooks.record("modo", "admitted");
        metrics.http.requests_total.get_or_create(&HttpRequestLabels {
            method: "GET".to_string(),
            route: "/health".to_string(),
            status: 200,
        })
        .inc();

        let text = metrics.encode().unwrap();
        assert!(text.contains("llm_degraded_replies_total{reason=\"circuit_open\"} 1"));
        assert!(text.contains("webhook_requests_total{provider=\"modo\",outcome=\"admitted\"} 1"));
        assert!(text.contains("http_requests_total{method=\"GET\",route=\"/health\",status=\"200\"} 1"));
    }
}
