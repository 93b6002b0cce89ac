//! Application state shared across all request handlers.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use pizzeria_resilience::{
    AnthropicClient, CircuitBreaker, Completion, CompletionProvider, CompletionRequest,
    ProviderError, ResilientInvoker, ResponseCache,
};
use pizzeria_webhooks::{
    InboundWebhookGate, ReplayGuard, WebhookProvider, WebhookSink, WebhooksState,
};

use crate::config::{Config, ConfigError};
use crate::metrics::MetricsRegistry;

/// Application state shared across all handlers.
///
/// Cloned per request; every field is behind an `Arc` or `Copy`.
#[derive(Clone)]
pub struct AppState {
    pub invoker: Arc<ResilientInvoker>,
    pub metrics: Arc<MetricsRegistry>,
    /// Service startup time for uptime calculation
    pub startup_time: Instant,
}

impl AppState {
    pub fn new(invoker: Arc<ResilientInvoker>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            invoker,
            metrics,
            startup_time: Instant::now(),
        }
    }

    /// Wire the LLM provider, breaker, cache and invoker from `config`.
    pub fn from_config(
        config: &Config,
        metrics: Arc<MetricsRegistry>,
    ) -> Result<Self, ConfigError> {
        let provider: Arc<dyn CompletionProvider> = match config.anthropic() {
            Some(anthropic) => Arc::new(
                AnthropicClient::new(anthropic)
                    .map_err(|e| ConfigError::invalid("ANTHROPIC_API_KEY", e))?,
            ),
            None => {
                tracing::warn!(
                    target: "llm_invoker",
                    "ANTHROPIC_API_KEY not configured - assistant replies will degrade"
                );
                Arc::new(UnconfiguredProvider)
            }
        };

        let breaker = Arc::new(
            CircuitBreaker::new(provider.name(), config.circuit_breaker())
                .with_metrics(metrics.outbound.clone()),
        );

        let cache = if config.cache_enabled {
            ResponseCache::in_memory(config.cache_max_entries)
        } else {
            tracing::info!(target: "response_cache", "Response cache disabled");
            ResponseCache::disabled()
        }
        .with_metrics(metrics.outbound.clone());

        let invoker = ResilientInvoker::new(provider, breaker)
            .with_cache(cache)
            .with_backoff(config.backoff())
            .with_config(config.invoker())
            .with_metrics(metrics.outbound.clone());

        Ok(Self::new(Arc::new(invoker), metrics))
    }
}

/// Build the webhook router state from `config`.
pub fn webhooks_state(
    config: &Config,
    metrics: &MetricsRegistry,
    sink: Arc<dyn WebhookSink>,
) -> WebhooksState {
    let mut gate = InboundWebhookGate::new(ReplayGuard::new(config.replay_window))
        .with_metrics(metrics.webhooks.clone());

    for provider in WebhookProvider::ALL {
        let policy = config.webhook_policy(provider);
        if policy.secret.is_none() {
            tracing::warn!(
                target: "webhook_gate",
                provider = %provider,
                "{}_WEBHOOK_SECRET not configured - skipping HMAC validation",
                provider.env_prefix()
            );
        }
        gate = gate.with_policy(provider, policy);
    }

    WebhooksState::new(Arc::new(gate), sink)
}

/// Stand-in provider used when no API key is configured.
///
/// Every call fails with a non-recoverable configuration error, so the
/// invoker degrades without retrying.
#[derive(Debug, Default)]
pub struct UnconfiguredProvider;

#[async_trait]
impl CompletionProvider for UnconfiguredProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, ProviderError> {
        Err(ProviderError::Configuration(
            "ANTHROPIC_API_KEY not configured".to_string(),
        ))
    }
}
