//! Admission gate for inbound webhooks.
//!
//! Checks run in a fixed order: source address, then signature, then replay.
//! The first failing check decides the outcome. A replayed body is not an
//! error; the caller acknowledges it without processing it again.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::StatusCode;

use crate::address::{first_hop, AddressPattern, AllowList};
use crate::error::WebhookError;
use crate::metrics::WebhookMetrics;
use crate::replay::ReplayGuard;
use crate::signature::{check_signature, SignatureCheck};

/// Known webhook senders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookProvider {
    /// Messaging (customer conversations).
    Chatwoot,
    /// Payments.
    Modo,
    /// Payments.
    MercadoPago,
}

impl WebhookProvider {
    pub const ALL: [WebhookProvider; 3] = [Self::Chatwoot, Self::Modo, Self::MercadoPago];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chatwoot => "chatwoot",
            Self::Modo => "modo",
            Self::MercadoPago => "mercadopago",
        }
    }

    /// Header carrying the hex HMAC of the body.
    #[must_use]
    pub fn signature_header(&self) -> &'static str {
        match self {
            Self::Chatwoot => "x-chatwoot-signature",
            Self::Modo => "x-modo-signature",
            Self::MercadoPago => "x-mercadopago-signature",
        }
    }

    /// Prefix of this provider's environment variables.
    #[must_use]
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::Chatwoot => "CHATWOOT",
            Self::Modo => "MODO",
            Self::MercadoPago => "MERCADOPAGO",
        }
    }

    /// Published sender addresses.
    #[must_use]
    pub fn default_allow_list(&self) -> AllowList {
        let entries: &[&str] = match self {
            Self::Chatwoot => &["54.226.73.99", "54.241.27.196", "54.219.37.83"],
            Self::Modo => &["190.112.0.0/16"],
            Self::MercadoPago => &["200.0.0.0/8"],
        };
        AllowList::new(
            entries
                .iter()
                .filter_map(|e| e.parse::<AddressPattern>().ok())
                .collect(),
        )
    }
}

impl fmt::Display for WebhookProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookProvider {
    type Err = WebhookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| WebhookError::UnknownProvider(s.to_string()))
    }
}

/// Per-provider admission settings.
#[derive(Clone)]
pub struct ProviderPolicy {
    pub allow_list: AllowList,
    /// HMAC secret. `None` turns signature checking off for the provider.
    pub secret: Option<String>,
}

impl fmt::Debug for ProviderPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderPolicy")
            .field("allow_list", &self.allow_list.to_string())
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ProviderPolicy {
    /// Published addresses, no secret.
    #[must_use]
    pub fn defaults_for(provider: WebhookProvider) -> Self {
        Self {
            allow_list: provider.default_allow_list(),
            secret: None,
        }
    }

    #[must_use]
    pub fn with_allow_list(mut self, allow_list: AllowList) -> Self {
        self.allow_list = allow_list;
        self
    }

    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }
}

/// What the gate sees of one HTTP request.
#[derive(Debug, Clone, Copy)]
pub struct InboundRequest<'a> {
    /// Raw body bytes as received.
    pub body: &'a [u8],
    /// Forwarded-for header, or the peer address when absent.
    pub observed_address: Option<&'a str>,
    /// Value of the provider's signature header.
    pub signature: Option<&'a str>,
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    AddressNotAllowed,
    SignatureMissing,
    SignatureInvalid,
}

impl Rejection {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AddressNotAllowed => StatusCode::FORBIDDEN,
            Self::SignatureMissing | Self::SignatureInvalid => StatusCode::UNAUTHORIZED,
        }
    }

    /// Metric outcome label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddressNotAllowed => "address_rejected",
            Self::SignatureMissing => "signature_missing",
            Self::SignatureInvalid => "signature_invalid",
        }
    }
}

impl From<Rejection> for WebhookError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::AddressNotAllowed => WebhookError::Forbidden,
            Rejection::SignatureMissing | Rejection::SignatureInvalid => {
                WebhookError::Unauthorized
            }
        }
    }
}

/// Gate outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Admitted,
    /// Same body seen inside the replay window; acknowledge, do not process.
    AlreadyProcessed,
    Rejected(Rejection),
}

impl GateDecision {
    /// Metric outcome label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admitted => "admitted",
            Self::AlreadyProcessed => "duplicate",
            Self::Rejected(rejection) => rejection.as_str(),
        }
    }
}

/// Address, signature and replay checks for every provider.
#[derive(Debug)]
pub struct InboundWebhookGate {
    policies: HashMap<WebhookProvider, ProviderPolicy>,
    replay: ReplayGuard,
    metrics: Option<Arc<WebhookMetrics>>,
}

impl InboundWebhookGate {
    /// Gate with published allow-lists and signature checks off.
    #[must_use]
    pub fn new(replay: ReplayGuard) -> Self {
        let policies = WebhookProvider::ALL
            .into_iter()
            .map(|p| (p, ProviderPolicy::defaults_for(p)))
            .collect();
        Self {
            policies,
            replay,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, provider: WebhookProvider, policy: ProviderPolicy) -> Self {
        self.policies.insert(provider, policy);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<WebhookMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn policy(&self, provider: WebhookProvider) -> Option<&ProviderPolicy> {
        self.policies.get(&provider)
    }

    /// Release an admitted body whose processing failed, so the provider's
    /// redelivery is not mistaken for a duplicate.
    pub fn forget(&self, body: &[u8]) {
        self.replay.forget(body);
    }

    /// Run the checks for `request` sent by `provider`.
    pub fn admit(&self, provider: WebhookProvider, request: &InboundRequest<'_>) -> GateDecision {
        let decision = self.evaluate(provider, request);
        if let Some(metrics) = &self.metrics {
            metrics.record(provider.as_str(), decision.as_str());
        }
        decision
    }

    fn evaluate(&self, provider: WebhookProvider, request: &InboundRequest<'_>) -> GateDecision {
        let hop = request.observed_address.and_then(first_hop);

        let allowed = self
            .policy(provider)
            .is_some_and(|policy| policy.allow_list.is_allowed(request.observed_address));
        if !allowed {
            tracing::warn!(
                target: "webhook_gate",
                provider = %provider,
                ip = hop.unwrap_or("unknown"),
                "Webhook rejected: source address not allowed"
            );
            return GateDecision::Rejected(Rejection::AddressNotAllowed);
        }

        let secret = self.policy(provider).and_then(|p| p.secret.as_deref());
        match check_signature(request.body, secret, request.signature) {
            SignatureCheck::Valid => {
                tracing::debug!(
                    target: "webhook_gate",
                    provider = %provider,
                    "Webhook signature validated"
                );
            }
            SignatureCheck::Disabled => {
                tracing::debug!(
                    target: "webhook_gate",
                    provider = %provider,
                    "No webhook secret configured, skipping signature check"
                );
            }
            SignatureCheck::Missing => {
                tracing::warn!(
                    target: "webhook_gate",
                    provider = %provider,
                    ip = hop.unwrap_or("unknown"),
                    "Webhook rejected: missing signature"
                );
                return GateDecision::Rejected(Rejection::SignatureMissing);
            }
            SignatureCheck::Invalid => {
                let provided = request.signature.unwrap_or_default();
                tracing::warn!(
                    target: "webhook_gate",
                    provider = %provider,
                    ip = hop.unwrap_or("unknown"),
                    signature_prefix = provided.get(..8).unwrap_or(provided),
                    "Webhook rejected: invalid signature"
                );
                return GateDecision::Rejected(Rejection::SignatureInvalid);
            }
        }

        if self.replay.is_duplicate(request.body) {
            tracing::info!(
                target: "webhook_gate",
                provider = %provider,
                body_len = request.body.len(),
                "Duplicate webhook acknowledged without processing"
            );
            return GateDecision::AlreadyProcessed;
        }

        GateDecision::Admitted
    }
}
