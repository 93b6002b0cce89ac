//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_secs: u64,
    pub llm: LlmHealth,
}

/// Overall health status.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Serving, but assistant replies are degraded.
    Degraded,
}

/// Circuit position as reported by the health endpoint.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CircuitStatus {
    Closed,
    Open,
}

/// LLM dependency status.
#[derive(Debug, Serialize)]
pub struct LlmHealth {
    pub provider: String,
    pub circuit: CircuitStatus,
    pub consecutive_failures: u32,
    pub cache_enabled: bool,
}

/// `GET /health`
///
/// Always 200: an open circuit degrades replies but the service still
/// answers webhooks and serves fallback texts.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let breaker = state.invoker.breaker();
    let snapshot = breaker.snapshot();

    // an open breaker past its cool-down admits the next call
    let (status, circuit) = if breaker.rejects_calls() {
        (HealthStatus::Degraded, CircuitStatus::Open)
    } else {
        (HealthStatus::Healthy, CircuitStatus::Closed)
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.startup_time.elapsed().as_secs(),
        llm: LlmHealth {
            provider: breaker.name().to_string(),
            circuit,
            consecutive_failures: snapshot.consecutive_failures,
            cache_enabled: state.invoker.cache().is_enabled(),
        },
    })
}
