//! Assistant reply endpoint.
//!
//! Turns a customer message plus a PII-free context into a reply through
//! the [`pizzeria_resilience::ResilientInvoker`]. The endpoint answers 200
//! even when the reply is a degraded fallback; `source` says which.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::NaiveTime;
use pizzeria_resilience::{
    CompletionRequest, ConversationContext, CustomerKind, Flow, ReplySource, Zone,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Longest accepted customer message, in characters.
const MAX_MESSAGE_CHARS: usize = 2000;

/// Request body for `POST /api/assistant/reply`.
#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub message: String,
    /// Detected from the message when absent.
    #[serde(default)]
    pub flow: Option<Flow>,
    #[serde(default)]
    pub context: ContextInput,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Caller-supplied context. The address, if given, is only used to derive
/// the delivery zone and is dropped afterwards.
#[derive(Debug, Default, Deserialize)]
pub struct ContextInput {
    #[serde(default)]
    pub customer_kind: Option<CustomerKind>,
    #[serde(default)]
    pub previous_orders: u32,
    #[serde(default)]
    pub zone: Option<Zone>,
    #[serde(default)]
    pub address: Option<String>,
    /// Local time `HH:MM`; the server clock when absent.
    #[serde(default)]
    pub local_time: Option<String>,
}

impl ContextInput {
    fn into_context(self) -> Result<ConversationContext, ApiError> {
        let time = match self.local_time.as_deref() {
            Some(raw) => NaiveTime::parse_from_str(raw, "%H:%M")
                .map_err(|_| ApiError::BadRequest("local_time must be HH:MM".to_string()))?,
            None => chrono::Local::now().time(),
        };
        let zone = self
            .zone
            .or_else(|| self.address.as_deref().map(Zone::from_address))
            .unwrap_or(Zone::FueraCobertura);

        Ok(ConversationContext::at(
            self.customer_kind.unwrap_or(CustomerKind::New),
            self.previous_orders,
            zone,
            time,
        ))
    }
}

/// Response body for `POST /api/assistant/reply`.
#[derive(Debug, Serialize)]
pub struct ReplyResponse {
    pub reply: String,
    pub source: ReplySource,
    pub flow: Flow,
}

/// `POST /api/assistant/reply`
pub async fn reply_handler(
    State(state): State<AppState>,
    payload: Result<Json<ReplyRequest>, JsonRejection>,
) -> Result<Json<ReplyResponse>, ApiError> {
    let Json(body) = payload?;
    let message = body.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "message exceeds {MAX_MESSAGE_CHARS} characters"
        )));
    }

    let flow = body.flow.unwrap_or_else(|| Flow::detect(message));
    let context = body.context.into_context()?;

    let mut request = CompletionRequest::new(flow, message, context);
    if let Some(max_tokens) = body.max_tokens {
        request = request.with_max_tokens(max_tokens);
    }

    tracing::debug!(
        target: "assistant",
        flow = %flow,
        message_len = message.len(),
        "Assistant reply requested"
    );

    let reply = state.invoker.invoke(&request).await;

    Ok(Json(ReplyResponse {
        reply: reply.text,
        source: reply.source,
        flow,
    }))
}
