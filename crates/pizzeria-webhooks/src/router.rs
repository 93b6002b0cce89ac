//! Axum router for inbound webhook endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ApiResult, WebhookError};
use crate::gate::{GateDecision, InboundRequest, InboundWebhookGate, WebhookProvider};

/// An admitted webhook, handed to the application.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub provider: WebhookProvider,
    pub received_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Receiver of admitted webhook events.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn deliver(&self, event: WebhookEvent) -> Result<(), WebhookError>;
}

/// Shared state for webhook handlers.
#[derive(Clone)]
pub struct WebhooksState {
    pub gate: Arc<InboundWebhookGate>,
    pub sink: Arc<dyn WebhookSink>,
}

impl WebhooksState {
    pub fn new(gate: Arc<InboundWebhookGate>, sink: Arc<dyn WebhookSink>) -> Self {
        Self { gate, sink }
    }
}

/// Body of a 200 response.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

/// Creates the webhook router.
pub fn webhooks_router(state: WebhooksState) -> Router {
    Router::new()
        .route("/webhooks/:provider", post(receive_webhook_handler))
        .with_state(state)
}

/// `POST /webhooks/:provider`
///
/// The body is taken as raw bytes so the signature is checked against
/// exactly what the sender signed.
async fn receive_webhook_handler(
    State(state): State<WebhooksState>,
    Path(provider): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let provider: WebhookProvider = provider.parse()?;

    let peer_ip = peer.map(|ConnectInfo(addr)| addr.ip().to_string());
    // A forwarded header that is not text is an unknown client, not the proxy.
    let observed_address = match headers.get("x-forwarded-for") {
        Some(value) => value.to_str().ok().or_else(|| {
            tracing::debug!(
                target: "webhook_gate",
                provider = %provider,
                "x-forwarded-for is not valid UTF-8"
            );
            None
        }),
        None => peer_ip.as_deref(),
    };
    let signature = headers
        .get(provider.signature_header())
        .and_then(|v| v.to_str().ok());

    let request = InboundRequest {
        body: &body,
        observed_address,
        signature,
    };

    match state.gate.admit(provider, &request) {
        GateDecision::Rejected(rejection) => Err(rejection.into()),
        GateDecision::AlreadyProcessed => Ok(Json(WebhookAck {
            success: true,
            event_id: None,
            message: Some("Webhook already processed"),
        })),
        GateDecision::Admitted => {
            let payload: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
                state.gate.forget(&body);
                tracing::warn!(
                    target: "webhook_gate",
                    provider = %provider,
                    error = %e,
                    "Admitted webhook body is not valid JSON"
                );
                WebhookError::InvalidPayload("body is not valid JSON".to_string())
            })?;

            let event = WebhookEvent {
                id: Uuid::new_v4(),
                provider,
                received_at: Utc::now(),
                payload,
            };
            let event_id = event.id;

            if let Err(e) = state.sink.deliver(event).await {
                state.gate.forget(&body);
                tracing::warn!(
                    target: "webhook_gate",
                    provider = %provider,
                    event_id = %event_id,
                    "Webhook delivery failed, redelivery will be processed"
                );
                return Err(e);
            }

            tracing::info!(
                target: "webhook_gate",
                provider = %provider,
                event_id = %event_id,
                "Webhook accepted"
            );

            Ok(Json(WebhookAck {
                success: true,
                event_id: Some(event_id),
                message: None,
            }))
        }
    }
}
