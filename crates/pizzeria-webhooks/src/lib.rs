//! Inbound webhook admission for payment and messaging providers.
//!
//! Every request runs through [`InboundWebhookGate`]: source address
//! allow-list, then HMAC-SHA256 signature over the raw body, then
//! content-based replay suppression. Rejections carry a typed reason that
//! the router maps to a generic 401 or 403; the reason itself is only
//! logged.

pub mod address;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod replay;
pub mod router;
pub mod signature;

pub use address::{AddressPattern, AllowList};
pub use error::WebhookError;
pub use gate::{
    GateDecision, InboundRequest, InboundWebhookGate, ProviderPolicy, Rejection, WebhookProvider,
};
pub use metrics::WebhookMetrics;
pub use replay::ReplayGuard;
pub use router::{webhooks_router, WebhookEvent, WebhookSink, WebhooksState};
