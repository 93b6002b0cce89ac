//! Common test utilities for pizzeria-webhooks integration tests.
//!
//! Provides a recording sink, signing helpers and a router fixture wired
//! with test secrets.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use pizzeria_webhooks::signature::compute_signature;
use pizzeria_webhooks::{
    webhooks_router, InboundWebhookGate, ProviderPolicy, ReplayGuard, WebhookError, WebhookEvent,
    WebhookMetrics, WebhookProvider, WebhookSink, WebhooksState,
};

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

pub const CHATWOOT_SECRET: &str = "whsec_chatwoot_test_12345";
pub const MODO_SECRET: &str = "whsec_modo_test_67890";

pub const CHATWOOT_IP: &str = "54.226.73.99";
pub const MODO_IP: &str = "190.112.33.7";
pub const MERCADOPAGO_IP: &str = "200.45.1.2";
pub const OUTSIDE_IP: &str = "203.0.113.9";

pub fn sign(secret: &str, body: &[u8]) -> String {
    compute_signature(secret, body)
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Sink that keeps every delivered event, or fails on demand.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<WebhookEvent>>,
    failures_left: AtomicUsize,
}

impl RecordingSink {
    /// Fails every delivery.
    pub fn failing() -> Self {
        Self::failing_times(usize::MAX)
    }

    /// Fails the first `times` deliveries, then records.
    pub fn failing_times(times: usize) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            failures_left: AtomicUsize::new(times),
        }
    }

    pub fn events(&self) -> Vec<WebhookEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookSink for RecordingSink {
    async fn deliver(&self, event: WebhookEvent) -> Result<(), WebhookError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(WebhookError::Internal("sink unavailable".to_string()));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Router fixture
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub sink: Arc<RecordingSink>,
    pub metrics: Arc<WebhookMetrics>,
}

/// Chatwoot and MODO signed, MercadoPago unsigned, published allow-lists.
pub fn test_gate() -> InboundWebhookGate {
    InboundWebhookGate::new(ReplayGuard::default())
        .with_policy(
            WebhookProvider::Chatwoot,
            ProviderPolicy::defaults_for(WebhookProvider::Chatwoot).with_secret(CHATWOOT_SECRET),
        )
        .with_policy(
            WebhookProvider::Modo,
            ProviderPolicy::defaults_for(WebhookProvider::Modo).with_secret(MODO_SECRET),
        )
}

pub fn test_app() -> TestApp {
    test_app_with_sink(Arc::new(RecordingSink::default()))
}

pub fn test_app_with_sink(sink: Arc<RecordingSink>) -> TestApp {
    let metrics = Arc::new(WebhookMetrics::new());
    let gate = Arc::new(test_gate().with_metrics(metrics.clone()));
    let router = webhooks_router(WebhooksState::new(gate, sink.clone()));
    TestApp {
        router,
        sink,
        metrics,
    }
}

/// Build a webhook POST.
pub fn webhook_request(
    provider: &str,
    body: &[u8],
    forwarded_for: Option<&str>,
    signature: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/webhooks/{provider}"))
        .header("content-type", "application/json");
    if let Some(ip) = forwarded_for {
        builder = builder.header("x-forwarded-for", ip);
    }
    if let Some(sig) = signature {
        builder = builder.header(format!("x-{provider}-signature"), sig);
    }
    builder.body(Body::from(body.to_vec())).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
