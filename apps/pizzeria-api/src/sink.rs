//! Default receiver for admitted webhooks.

use async_trait::async_trait;
use pizzeria_webhooks::{WebhookError, WebhookEvent, WebhookSink};

/// Logs each admitted event. Payloads are not logged; they can carry
/// customer data.
#[derive(Debug, Default)]
pub struct LoggingSink;

#[async_trait]
impl WebhookSink for LoggingSink {
    async fn deliver(&self, event: WebhookEvent) -> Result<(), WebhookError> {
        let event_type = event
            .payload
            .get("event")
            .or_else(|| event.payload.get("type"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");

        tracing::info!(
            target: "webhook_sink",
            event_id = %event.id,
            provider = %event.provider,
            event_type,
            received_at = %event.received_at.to_rfc3339(),
            "Webhook event received"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pizzeria_webhooks::WebhookProvider;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_logging_sink_accepts_events() {
        let event = WebhookEvent {
            id: Uuid::nil(),
            provider: WebhookProvider::Chatwoot,
            received_at: Utc::now(),
            payload: serde_json::json!({ "event": "message_created" }),
        };
        assert!(LoggingSink.deliver(event).await.is_ok());
    }
}
