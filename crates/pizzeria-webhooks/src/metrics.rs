//! Prometheus metrics for inbound webhooks.

use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

/// Labels: provider and gate outcome.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct WebhookLabels {
    pub provider: String,
    pub outcome: String,
}

/// Inbound webhook metrics.
#[derive(Default)]
pub struct WebhookMetrics {
    pub requests: Family<WebhookLabels, Counter>,
}

impl std::fmt::Debug for WebhookMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookMetrics").finish_non_exhaustive()
    }
}

impl WebhookMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "webhook_requests",
            "Inbound webhook requests by provider and gate outcome",
            self.requests.clone(),
        );
    }

    pub fn record(&self, provider: &str, outcome: &str) {
        self.requests
            .get_or_create(&WebhookLabels {
                provider: provider.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
    }

    /// Current count for one provider/outcome pair.
    #[must_use]
    pub fn count(&self, provider: &str, outcome: &str) -> u64 {
        self.requests
            .get_or_create(&WebhookLabels {
                provider: provider.to_string(),
                outcome: outcome.to_string(),
            })
            .get()
    }
}
