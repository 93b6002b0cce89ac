//! Failure-count circuit breaker for a single downstream dependency.
//!
//! Two states only: closed (calls permitted, failures tracked) and open
//! (calls rejected). There is no half-open trial phase: once the cool-down has
//! elapsed, the next admission check lazily resets the counters and the call
//! proceeds as an ordinary closed-state call.
//!
//! One breaker exists per logical dependency and is shared by every caller
//! through an `Arc`. Each operation is a single critical section; interleaving
//! between `can_attempt` and a later `record_*` from other callers is
//! tolerated because the failure count is a heuristic threshold.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::metrics::OutboundMetrics;

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time since the last failure after which an open circuit resets.
    pub cool_down: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_millis(60_000),
        }
    }
}

impl CircuitBreakerConfig {
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_cool_down(mut self, cool_down: Duration) -> Self {
        self.cool_down = cool_down;
        self
    }
}

/// Snapshot of a breaker's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CircuitState {
    pub consecutive_failures: u32,
    pub last_failure_at: Option<Instant>,
    pub is_open: bool,
}

/// Circuit breaker guarding one downstream provider.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<CircuitState>,
    metrics: Option<Arc<OutboundMetrics>>,
}

impl CircuitBreaker {
    /// Create a closed breaker for the provider called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(CircuitState::default()),
            metrics: None,
        }
    }

    /// Create a breaker with the default threshold (5) and cool-down (60 s).
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Publish state changes to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<OutboundMetrics>) -> Self {
        metrics.set_circuit(&self.name, false, 0);
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current counters, without applying the lazy cool-down reset.
    #[must_use]
    pub fn snapshot(&self) -> CircuitState {
        *self.lock()
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock().is_open
    }

    /// Whether a call would be rejected right now.
    ///
    /// Applies the same cool-down rule as [`Self::can_attempt`] but leaves
    /// the state untouched; the reset still happens on the next call.
    #[must_use]
    pub fn rejects_calls(&self) -> bool {
        let state = self.lock();
        state.is_open && !self.cooled_down(&state)
    }

    fn cooled_down(&self, state: &CircuitState) -> bool {
        state
            .last_failure_at
            .map_or(true, |at| at.elapsed() > self.config.cool_down)
    }

    /// Whether a call may be attempted now.
    ///
    /// An open breaker whose last failure is older than the cool-down is
    /// reset to `{0, -, closed}` and admits the call.
    pub fn can_attempt(&self) -> bool {
        let mut state = self.lock();
        if !state.is_open {
            return true;
        }

        if !self.cooled_down(&state) {
            return false;
        }

        *state = CircuitState::default();
        drop(state);

        tracing::info!(
            target: "circuit_breaker",
            provider = %self.name,
            "Circuit breaker reset after cool-down"
        );
        self.publish(false, 0);
        true
    }

    /// Record a successful call.
    ///
    /// Forgives one failure and closes an open breaker immediately.
    pub fn record_success(&self) {
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_sub(1);
        let was_open = std::mem::replace(&mut state.is_open, false);
        let failures = state.consecutive_failures;
        drop(state);

        if was_open {
            tracing::info!(
                target: "circuit_breaker",
                provider = %self.name,
                "Circuit breaker closed after successful request"
            );
        }
        self.publish(false, failures);
    }

    /// Record a terminal failure of a call.
    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure_at = Some(Instant::now());
        let failures = state.consecutive_failures;
        let opened = failures >= self.config.failure_threshold && !state.is_open;
        if failures >= self.config.failure_threshold {
            state.is_open = true;
        }
        let is_open = state.is_open;
        drop(state);

        if opened {
            tracing::error!(
                target: "circuit_breaker",
                provider = %self.name,
                failures,
                threshold = self.config.failure_threshold,
                "Circuit breaker opened"
            );
        }
        self.publish(is_open, failures);
    }

    fn publish(&self, open: bool, failures: u32) {
        if let Some(metrics) = &self.metrics {
            metrics.set_circuit(&self.name, open, failures);
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
