//! Prometheus metrics for outbound LLM calls.
//!
//! Families are owned here and registered into the application's
//! [`Registry`] by [`OutboundMetrics::register`].

use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge, histogram::Histogram},
    registry::Registry,
};

/// Labels: conversation flow and terminal status.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub flow: String,
    pub status: String,
}

/// Labels: conversation flow only.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FlowLabels {
    pub flow: String,
}

/// Labels: conversation flow and classified error type.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub flow: String,
    pub error_type: String,
}

/// Labels: token direction (`input` / `output`).
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TokenLabels {
    pub kind: String,
}

/// Labels: downstream provider guarded by a circuit breaker.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProviderLabels {
    pub provider: String,
}

/// Labels: reason a degraded reply was served.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DegradedLabels {
    pub reason: String,
}

/// Labels: cache name.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CacheLabels {
    pub cache: String,
}

/// Labels: cache name and failing operation.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CacheErrorLabels {
    pub cache: String,
    pub operation: String,
}

/// Outbound call metrics.
pub struct OutboundMetrics {
    pub requests: Family<RequestLabels, Counter>,
    pub attempts: Family<FlowLabels, Counter>,
    pub errors: Family<ErrorLabels, Counter>,
    pub tokens: Family<TokenLabels, Counter>,
    pub request_duration_seconds: Family<FlowLabels, Histogram>,
    pub circuit_state: Family<ProviderLabels, Gauge>,
    pub circuit_failures: Family<ProviderLabels, Gauge>,
    pub degraded_replies: Family<DegradedLabels, Counter>,
    pub cache_hits: Family<CacheLabels, Counter>,
    pub cache_misses: Family<CacheLabels, Counter>,
    pub cache_errors: Family<CacheErrorLabels, Counter>,
}

impl std::fmt::Debug for OutboundMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundMetrics").finish_non_exhaustive()
    }
}

impl Default for OutboundMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: Family::default(),
            attempts: Family::default(),
            errors: Family::default(),
            tokens: Family::default(),
            // LLM latencies are seconds, not milliseconds
            request_duration_seconds: Family::new_with_constructor(|| {
                Histogram::new([0.5, 1.0, 2.0, 5.0, 10.0, 30.0].into_iter())
            }),
            circuit_state: Family::default(),
            circuit_failures: Family::default(),
            degraded_replies: Family::default(),
            cache_hits: Family::default(),
            cache_misses: Family::default(),
            cache_errors: Family::default(),
        }
    }

    /// Register every family into `registry`.
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "llm_api_requests",
            "Outbound LLM calls by flow and terminal status",
            self.requests.clone(),
        );
        registry.register(
            "llm_api_attempts",
            "Individual outbound LLM attempts, retries included",
            self.attempts.clone(),
        );
        registry.register(
            "llm_api_errors",
            "Failed outbound LLM attempts by error type",
            self.errors.clone(),
        );
        registry.register(
            "llm_tokens_used",
            "Tokens consumed by the LLM provider",
            self.tokens.clone(),
        );
        registry.register(
            "llm_request_duration_seconds",
            "Latency of LLM call attempts in seconds",
            self.request_duration_seconds.clone(),
        );
        registry.register(
            "llm_circuit_breaker_state",
            "Circuit breaker state (0=closed, 1=open)",
            self.circuit_state.clone(),
        );
        registry.register(
            "llm_circuit_breaker_failures",
            "Consecutive failures tracked by the circuit breaker",
            self.circuit_failures.clone(),
        );
        registry.register(
            "llm_degraded_replies",
            "Static fallback replies served instead of a provider answer",
            self.degraded_replies.clone(),
        );
        registry.register(
            "llm_cache_hits",
            "Response cache hits",
            self.cache_hits.clone(),
        );
        registry.register(
            "llm_cache_misses",
            "Response cache misses",
            self.cache_misses.clone(),
        );
        registry.register(
            "llm_cache_errors",
            "Response cache tier failures (swallowed)",
            self.cache_errors.clone(),
        );
    }

    pub fn record_attempt(&self, flow: &str) {
        self.attempts
            .get_or_create(&FlowLabels {
                flow: flow.to_string(),
            })
            .inc();
    }

    pub fn record_request(&self, flow: &str, status: &str) {
        self.requests
            .get_or_create(&RequestLabels {
                flow: flow.to_string(),
                status: status.to_string(),
            })
            .inc();
    }

    pub fn record_error(&self, flow: &str, error_type: &str) {
        self.errors
            .get_or_create(&ErrorLabels {
                flow: flow.to_string(),
                error_type: error_type.to_string(),
            })
            .inc();
    }

    pub fn record_tokens(&self, input: u64, output: u64) {
        self.tokens
            .get_or_create(&TokenLabels {
                kind: "input".to_string(),
            })
            .inc_by(input);
        self.tokens
            .get_or_create(&TokenLabels {
                kind: "output".to_string(),
            })
            .inc_by(output);
    }

    pub fn observe_duration(&self, flow: &str, seconds: f64) {
        self.request_duration_seconds
            .get_or_create(&FlowLabels {
                flow: flow.to_string(),
            })
            .observe(seconds);
    }

    pub fn set_circuit(&self, provider: &str, open: bool, failures: u32) {
        let labels = ProviderLabels {
            provider: provider.to_string(),
        };
        self.circuit_state
            .get_or_create(&labels)
            .set(i64::from(open));
        self.circuit_failures
            .get_or_create(&labels)
            .set(i64::from(failures));
    }

    pub fn record_degraded(&self, reason: &str) {
        self.degraded_replies
            .get_or_create(&DegradedLabels {
                reason: reason.to_string(),
            })
            .inc();
    }

    pub fn record_cache_lookup(&self, cache: &str, hit: bool) {
        let labels = CacheLabels {
            cache: cache.to_string(),
        };
        if hit {
            self.cache_hits.get_or_create(&labels).inc();
        } else {
            self.cache_misses.get_or_create(&labels).inc();
        }
    }

    pub fn record_cache_error(&self, cache: &str, operation: &str) {
        self.cache_errors
            .get_or_create(&CacheErrorLabels {
                cache: cache.to_string(),
                operation: operation.to_string(),
            })
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_encode() {
        let metrics = OutboundMetrics::new();
        let mut registry = Registry::default();
        metrics.register(&mut registry);

        metrics.record_request("order_taking", "success");
        metrics.record_tokens(120, 40);
        metrics.set_circuit("anthropic", true, 5);

        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, &registry).unwrap();

        assert!(buf.contains("llm_api_requests_total"));
        assert!(buf.contains("flow=\"order_taking\""));
        assert!(buf.contains("llm_tokens_used_total{kind=\"input\"} 120"));
        assert!(buf.contains("llm_circuit_breaker_state{provider=\"anthropic\"} 1"));
    }

    #[test]
    fn test_cache_lookup_counters() {
        let metrics = OutboundMetrics::new();
        metrics.record_cache_lookup("llm", true);
        metrics.record_cache_lookup("llm", false);
        metrics.record_cache_lookup("llm", false);

        let labels = CacheLabels {
            cache: "llm".to_string(),
        };
        assert_eq!(metrics.cache_hits.get_or_create(&labels).get(), 1);
        assert_eq!(metrics.cache_misses.get_or_create(&labels).get(), 2);
    }
}
