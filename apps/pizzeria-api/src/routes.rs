//! HTTP router assembly.

use std::sync::Arc;

use axum::{
    body::Body,
    routing::{get, post},
    Router,
};
use pizzeria_webhooks::{webhooks_router, WebhooksState};
use tower_http::trace::TraceLayer;

use crate::assistant::reply_handler;
use crate::health::health_handler;
use crate::logging::request_span;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::state::AppState;

/// Build the full application router.
///
/// - `GET /health`
/// - `GET /metrics`
/// - `POST /api/assistant/reply`
/// - `POST /api/webhooks/:provider`
pub fn create_router(state: AppState, webhooks: WebhooksState) -> Router {
    let metrics = Arc::clone(&state.metrics);

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/assistant/reply", post(reply_handler))
        .with_state(state)
        .nest("/api", webhooks_router(webhooks))
        .layer(axum::middleware::from_fn_with_state(
            metrics,
            metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(request_span::<Body>))
}
