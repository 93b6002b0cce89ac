//! Seam between the invoker and a concrete LLM provider.

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::request::CompletionRequest;

/// A text completion with token usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A provider of text completions.
///
/// Implementations perform exactly one network attempt per call; retries,
/// timeouts and circuit breaking belong to [`crate::ResilientInvoker`].
/// Dropping the returned future must abort the in-flight request.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Name used for logs, metrics and the circuit breaker.
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;
}
