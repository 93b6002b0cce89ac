//! Common test utilities for pizzeria-resilience integration tests.
//!
//! Provides a scripted completion provider and request fixtures so the
//! invoker can be exercised without a network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveTime;
use pizzeria_resilience::{
    BackoffPolicy, CircuitBreaker, Completion, CompletionProvider, CompletionRequest,
    ConversationContext, CustomerKind, Flow, ProviderError, ResilientInvoker, Zone,
};

// ---------------------------------------------------------------------------
// ScriptedProvider
// ---------------------------------------------------------------------------

/// One scripted step for [`ScriptedProvider`].
#[derive(Debug, Clone)]
pub enum Step {
    Reply(&'static str),
    Fail(ProviderError),
    /// Never completes; only a timeout ends the attempt.
    Hang,
}

/// Provider that plays back a queue of steps, then repeats the fallback.
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>, fallback: Step) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            fallback,
            calls: AtomicU32::new(0),
        })
    }

    /// Always answers with `text`.
    pub fn always(text: &'static str) -> Arc<Self> {
        Self::new(Vec::new(), Step::Reply(text))
    }

    /// Always fails with `error`.
    pub fn failing(error: ProviderError) -> Arc<Self> {
        Self::new(Vec::new(), Step::Fail(error))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let mut steps = self.steps.lock().unwrap();
        steps.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Step::Reply(text) => Ok(Completion {
                text: text.to_string(),
                input_tokens: 150,
                output_tokens: 40,
            }),
            Step::Fail(error) => Err(error),
            Step::Hang => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn dinner_time() -> NaiveTime {
    NaiveTime::from_hms_opt(20, 30, 0).unwrap()
}

pub fn order_request(message: &str) -> CompletionRequest {
    let context = ConversationContext::at(CustomerKind::Returning, 4, Zone::Norte, dinner_time());
    CompletionRequest::new(Flow::OrderTaking, message, context)
}

/// Invoker over `provider` with a fresh default breaker and small, jitter-free
/// backoff.
pub fn invoker_for(provider: Arc<ScriptedProvider>) -> ResilientInvoker {
    ResilientInvoker::new(provider, Arc::new(CircuitBreaker::with_defaults("scripted")))
        .with_backoff(BackoffPolicy::new(
            Duration::from_millis(100),
            Duration::from_secs(1),
            Duration::ZERO,
        ))
}
