//! Anthropic Messages API client.
//!
//! One `complete` call is one HTTP attempt. HTTP statuses and transport
//! failures are mapped onto [`ProviderError`] so the invoker can decide
//! whether to retry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::provider::{Completion, CompletionProvider};
use crate::request::CompletionRequest;

/// Anthropic API version header value.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Configuration for [`AnthropicClient`].
#[derive(Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl AnthropicConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message; 1],
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

/// HTTP client for the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Configuration` if the API key is malformed or
    /// the HTTP client cannot be built.
    pub fn new(config: AnthropicConfig) -> Result<Self, ProviderError> {
        if !config.api_key.starts_with("sk-ant-") {
            return Err(ProviderError::Configuration(
                "ANTHROPIC_API_KEY missing or invalid".to_string(),
            ));
        }

        // No overall timeout here: the invoker bounds each attempt and drops
        // the future, which aborts the request.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("pizzeria-resilience/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ProviderError::Configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        tracing::info!(
            target: "llm_client",
            model = %config.model,
            "Anthropic client initialized"
        );

        Ok(Self { client, config })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionProvider for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: request.max_tokens,
            system: request.flow.system_prompt(),
            messages: [Message {
                role: "user",
                content: request.user_content(),
            }],
        };

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_status(status, &text));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let first = parsed
            .content
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("empty content".to_string()))?;

        match (first.kind.as_str(), first.text) {
            ("text", Some(text)) => Ok(Completion {
                text,
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            }),
            (kind, _) => Err(ProviderError::MalformedResponse(format!(
                "unexpected content block type: {kind}"
            ))),
        }
    }
}

fn map_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else if err.is_connect() || err.is_request() || err.is_body() {
        ProviderError::ConnectionReset(err.to_string())
    } else {
        ProviderError::Upstream {
            status: err.status().map_or(0, |s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

fn map_status(status: StatusCode, body: &str) -> ProviderError {
    let detail = serde_json::from_str::<ApiErrorBody>(body).ok();
    let message = detail
        .as_ref()
        .map_or_else(|| body.chars().take(200).collect(), |d| d.error.message.clone());

    // the API also reports overload inside the error body
    if detail
        .as_ref()
        .is_some_and(|d| d.error.kind == "overloaded_error")
    {
        return ProviderError::Overloaded;
    }

    match status.as_u16() {
        429 => ProviderError::RateLimited,
        503 | 529 => ProviderError::Overloaded,
        408 | 504 => ProviderError::Timeout,
        400 | 422 => ProviderError::BadRequest(message),
        401 | 403 => ProviderError::Unauthorized,
        code => ProviderError::Upstream {
            status: code,
            message,
        },
    }
}
