//! Outbound resilience for calls to the LLM provider.
//!
//! A single logical call flows through [`ResilientInvoker`]:
//!
//! 1. content-addressed [`ResponseCache`] lookup (fail-open),
//! 2. [`CircuitBreaker`] admission check,
//! 3. token budget guard,
//! 4. bounded retry loop with [`BackoffPolicy`] delays and a hard per-attempt
//!    timeout,
//! 5. breaker bookkeeping and cache write on success.
//!
//! The invoker never returns an error: callers always receive a [`Reply`]
//! whose [`ReplySource`] tells a real answer apart from each degraded case.

pub mod anthropic;
pub mod backoff;
pub mod cache;
pub mod circuit_breaker;
pub mod error;
pub mod invoker;
pub mod metrics;
pub mod provider;
pub mod request;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use backoff::BackoffPolicy;
pub use cache::{MemoryStore, ResponseCache, ResponseStore};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::{CacheError, ProviderError};
pub use invoker::{InvokerConfig, Reply, ReplySource, ResilientInvoker};
pub use metrics::OutboundMetrics;
pub use provider::{Completion, CompletionProvider};
pub use request::{CompletionRequest, ConversationContext, CustomerKind, Flow, Zone};
