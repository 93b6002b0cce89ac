//! Resilient invocation of the LLM provider.
//!
//! [`ResilientInvoker::invoke`] always yields a [`Reply`]. Failures degrade
//! to one of three static customer-facing texts, distinguishable through
//! [`ReplySource`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::backoff::BackoffPolicy;
use crate::cache::{ResponseCache, DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::ProviderError;
use crate::metrics::OutboundMetrics;
use crate::provider::CompletionProvider;
use crate::request::CompletionRequest;

/// Served while the circuit breaker rejects calls.
pub const CIRCUIT_OPEN_REPLY: &str = "El servicio de IA está temporalmente no disponible. \
     Por favor, intenta nuevamente en unos minutos o habla con un operador.";

/// Served once every attempt has failed, or on a non-recoverable error.
pub const RETRIES_EXHAUSTED_REPLY: &str = "Lo siento, no puedo procesar tu solicitud en este \
     momento debido a problemas técnicos. ¿Deseas hablar con un operador?";

/// Served when a request asks for more tokens than one session may use.
pub const BUDGET_EXCEEDED_REPLY: &str = "Lo siento, la solicitud excede el límite de tokens \
     permitido. Por favor, simplifica tu consulta.";

/// Invoker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokerConfig {
    /// Attempts per logical call, first one included.
    pub max_attempts: u32,
    /// Hard bound on a single attempt.
    pub request_timeout: Duration,
    /// TTL of cached replies.
    pub cache_ttl: Duration,
    /// Largest `max_tokens` a single request may ask for.
    pub max_tokens_per_session: u32,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            request_timeout: Duration::from_millis(30_000),
            cache_ttl: DEFAULT_TTL,
            max_tokens_per_session: 6600,
        }
    }
}

impl InvokerConfig {
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_max_tokens_per_session(mut self, max_tokens: u32) -> Self {
        self.max_tokens_per_session = max_tokens;
        self
    }
}

/// Where a reply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Cache,
    Provider,
    CircuitOpen,
    RetriesExhausted,
    BudgetExceeded,
}

impl ReplySource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Provider => "provider",
            Self::CircuitOpen => "circuit_open",
            Self::RetriesExhausted => "retries_exhausted",
            Self::BudgetExceeded => "budget_exceeded",
        }
    }

    /// Whether the text is a static fallback rather than a model answer.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !matches!(self, Self::Cache | Self::Provider)
    }
}

impl std::fmt::Display for ReplySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text handed back to the conversation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

impl Reply {
    fn degraded(source: ReplySource) -> Self {
        let text = match source {
            ReplySource::CircuitOpen => CIRCUIT_OPEN_REPLY,
            ReplySource::BudgetExceeded => BUDGET_EXCEEDED_REPLY,
            ReplySource::Cache | ReplySource::Provider | ReplySource::RetriesExhausted => {
                RETRIES_EXHAUSTED_REPLY
            }
        };
        Self {
            text: text.to_string(),
            source,
        }
    }
}

/// Cache, circuit breaker, budget guard and bounded retries around one
/// [`CompletionProvider`].
#[derive(Clone)]
pub struct ResilientInvoker {
    provider: Arc<dyn CompletionProvider>,
    breaker: Arc<CircuitBreaker>,
    cache: ResponseCache,
    backoff: BackoffPolicy,
    config: InvokerConfig,
    metrics: Option<Arc<OutboundMetrics>>,
}

impl ResilientInvoker {
    /// Invoker with default tuning and an in-memory cache.
    #[must_use]
    pub fn new(provider: Arc<dyn CompletionProvider>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            provider,
            breaker,
            cache: ResponseCache::in_memory(DEFAULT_MAX_ENTRIES),
            backoff: BackoffPolicy::default(),
            config: InvokerConfig::default(),
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: InvokerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<OutboundMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    #[must_use]
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    #[must_use]
    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    /// Produce a reply for `request`.
    ///
    /// Order of checks: cache, circuit breaker, token budget, then up to
    /// `max_attempts` provider calls. Only a terminal failure is recorded on
    /// the breaker.
    pub async fn invoke(&self, request: &CompletionRequest) -> Reply {
        let flow = request.flow.as_str();
        let key = request.cache_key();

        if let Some(text) = self.cache.get(&key).await {
            tracing::debug!(target: "llm_invoker", flow, "Serving reply from cache");
            self.count_request(flow, "cache_hit");
            return Reply {
                text,
                source: ReplySource::Cache,
            };
        }

        if !self.breaker.can_attempt() {
            tracing::warn!(
                target: "llm_invoker",
                flow,
                provider = %self.provider.name(),
                "Circuit breaker open, serving fallback reply"
            );
            return self.degrade(flow, ReplySource::CircuitOpen);
        }

        if request.max_tokens > self.config.max_tokens_per_session {
            tracing::warn!(
                target: "llm_invoker",
                flow,
                requested = request.max_tokens,
                limit = self.config.max_tokens_per_session,
                "Token budget exceeded"
            );
            return self.degrade(flow, ReplySource::BudgetExceeded);
        }

        let timeout = request.timeout.unwrap_or(self.config.request_timeout);
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 0..max_attempts {
            if let Some(metrics) = &self.metrics {
                metrics.record_attempt(flow);
            }
            let started = Instant::now();

            // dropping the timed-out future aborts the in-flight request
            let outcome = match tokio::time::timeout(timeout, self.provider.complete(request)).await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::Timeout),
            };
            let elapsed = started.elapsed();
            if let Some(metrics) = &self.metrics {
                metrics.observe_duration(flow, elapsed.as_secs_f64());
            }

            match outcome {
                Ok(completion) => {
                    self.breaker.record_success();
                    self.cache
                        .set(&key, completion.text.clone(), self.config.cache_ttl)
                        .await;

                    if let Some(metrics) = &self.metrics {
                        metrics.record_tokens(completion.input_tokens, completion.output_tokens);
                    }
                    self.count_request(flow, "success");

                    tracing::info!(
                        target: "llm_invoker",
                        flow,
                        attempt = attempt + 1,
                        duration_ms = elapsed.as_millis() as u64,
                        input_tokens = completion.input_tokens,
                        output_tokens = completion.output_tokens,
                        "LLM reply received"
                    );
                    return Reply {
                        text: completion.text,
                        source: ReplySource::Provider,
                    };
                }
                Err(e) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_error(flow, e.error_type());
                    }

                    let recoverable = e.is_recoverable();
                    let last_attempt = attempt + 1 >= max_attempts;
                    if !recoverable || last_attempt {
                        tracing::error!(
                            target: "llm_invoker",
                            flow,
                            attempt = attempt + 1,
                            duration_ms = elapsed.as_millis() as u64,
                            error = %e,
                            recoverable,
                            "LLM call failed"
                        );
                        self.breaker.record_failure();
                        break;
                    }

                    let delay = self.backoff.delay(attempt);
                    tracing::warn!(
                        target: "llm_invoker",
                        flow,
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying LLM call"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        self.degrade(flow, ReplySource::RetriesExhausted)
    }

    fn degrade(&self, flow: &str, source: ReplySource) -> Reply {
        if let Some(metrics) = &self.metrics {
            metrics.record_degraded(source.as_str());
        }
        self.count_request(flow, source.as_str());
        Reply::degraded(source)
    }

    fn count_request(&self, flow: &str, status: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_request(flow, status);
        }
    }
}
