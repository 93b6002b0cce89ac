//! Request descriptors for the assistant and their cache keys.
//!
//! The conversation context carries no PII: customer names, phone numbers and
//! street addresses never leave the service, only coarse categories do.

use std::fmt;
use std::time::Duration;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Conversation flow, selecting the system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    /// First contact: greet and ask what the customer needs.
    Reception,
    /// Taking an order.
    OrderTaking,
    /// Summarising and confirming an order.
    Confirmation,
    /// Menu, opening hours and delivery-zone questions.
    General,
}

impl Flow {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reception => "reception",
            Self::OrderTaking => "order_taking",
            Self::Confirmation => "confirmation",
            Self::General => "general",
        }
    }

    /// Keyword-based intent detection for an incoming customer message.
    #[must_use]
    pub fn detect(message: &str) -> Self {
        let lower = message.to_lowercase();
        let mentions = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        if mentions(&["mi pedido", "estado", "cuándo", "cuando llega"]) {
            Self::Confirmation
        } else if mentions(&["quiero", "pizza", "empanada", "pedir"]) {
            Self::OrderTaking
        } else {
            Self::General
        }
    }

    #[must_use]
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::Reception => {
                "You are the customer assistant of a pizzeria in Necochea, Argentina. \
                 Reply in Spanish.\n\
                 - Greet briefly and kindly\n\
                 - Ask what the customer needs (new order, order status, other)\n\
                 - Outside business hours, say we open tomorrow from 18:00\n\
                 - At most two lines"
            }
            Self::OrderTaking => {
                "You take orders for a pizzeria. Reply in Spanish.\n\
                 - Confirm the requested items exist on the menu\n\
                 - Check the delivery zone for deliveries\n\
                 - Compute the total\n\
                 - Offer payment methods (cash, card, MercadoPago)\n\
                 - Be professional and efficient"
            }
            Self::Confirmation => {
                "You confirm pizzeria orders. Reply in Spanish.\n\
                 - Summarise the order (items, total, delivery method)\n\
                 - Give the estimated time\n\
                 - Ask for final confirmation\n\
                 - Be brief and clear"
            }
            Self::General => {
                "You are a friendly pizzeria assistant. Reply in Spanish.\n\
                 - Answer questions about the menu, opening hours and delivery zones\n\
                 - For anything out of scope, offer to hand over to a human operator\n\
                 - Be concise"
            }
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerKind {
    New,
    Vip,
    Returning,
}

impl CustomerKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Vip => "vip",
            Self::Returning => "returning",
        }
    }
}

/// Delivery zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Centro,
    Norte,
    Sur,
    FueraCobertura,
}

impl Zone {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Centro => "centro",
            Self::Norte => "norte",
            Self::Sur => "sur",
            Self::FueraCobertura => "fuera_cobertura",
        }
    }

    /// Coarse zone lookup from a free-form street address.
    #[must_use]
    pub fn from_address(address: &str) -> Self {
        let lower = address.to_lowercase();
        let mentions = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        if mentions(&["centro", "av. 79", "calle 61"]) {
            Self::Centro
        } else if mentions(&["norte", "av. 80"]) {
            Self::Norte
        } else if mentions(&["sur", "calle 58"]) {
            Self::Sur
        } else {
            Self::FueraCobertura
        }
    }
}

/// Opening hours run from 18:00 to 01:00 local time.
#[must_use]
pub fn is_business_hours(time: NaiveTime) -> bool {
    time.hour() >= 18 || time.hour() < 1
}

/// PII-free context attached to every assistant request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub customer_kind: CustomerKind,
    pub previous_orders: u32,
    pub zone: Zone,
    /// Local wall-clock time, `HH:MM`.
    pub local_time: String,
    pub business_hours: bool,
}

impl ConversationContext {
    /// Build a context for `time`, deriving the business-hours flag.
    #[must_use]
    pub fn at(customer_kind: CustomerKind, previous_orders: u32, zone: Zone, time: NaiveTime) -> Self {
        Self {
            customer_kind,
            previous_orders,
            zone,
            local_time: time.format("%H:%M").to_string(),
            business_hours: is_business_hours(time),
        }
    }
}

/// Fields of the context that are stable for the same intent. `local_time`
/// and `previous_orders` change request to request and are left out.
#[derive(Serialize)]
struct StableContext<'a> {
    customer_kind: &'a str,
    zone: &'a str,
    business_hours: bool,
}

#[derive(Serialize)]
struct CacheKeyPayload<'a> {
    flow: &'a str,
    message: String,
    context: StableContext<'a>,
}

/// One logical assistant call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub flow: Flow,
    pub message: String,
    pub context: ConversationContext,
    /// Output size budget for the provider.
    pub max_tokens: u32,
    /// Per-attempt timeout override.
    pub timeout: Option<Duration>,
}

impl CompletionRequest {
    /// Default output budget per reply.
    pub const DEFAULT_MAX_TOKENS: u32 = 500;

    #[must_use]
    pub fn new(flow: Flow, message: impl Into<String>, context: ConversationContext) -> Self {
        Self {
            flow,
            message: message.into(),
            context,
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Deterministic cache key: hex SHA-256 of the flow, the normalised
    /// message and the stable subset of the context.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let payload = CacheKeyPayload {
            flow: self.flow.as_str(),
            message: self.message.trim().to_lowercase(),
            context: StableContext {
                customer_kind: self.context.customer_kind.as_str(),
                zone: self.context.zone.as_str(),
                business_hours: self.context.business_hours,
            },
        };
        // serializing plain strings and bools cannot fail
        let canonical = serde_json::to_vec(&payload).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }

    /// User turn sent to the provider: context block, then the message.
    #[must_use]
    pub fn user_content(&self) -> String {
        let ctx = &self.context;
        format!(
            "[CONTEXT]\nCustomer: {} ({} previous orders)\nZone: {}\nTime: {}\nBusiness hours: {}\n\n[MESSAGE]\n{}",
            ctx.customer_kind.as_str(),
            ctx.previous_orders,
            ctx.zone.as_str(),
            ctx.local_time,
            if ctx.business_hours { "yes" } else { "no" },
            self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ConversationContext {
        ConversationContext {
            customer_kind: CustomerKind::Returning,
            previous_orders: 3,
            zone: Zone::Centro,
            local_time: "20:15".to_string(),
            business_hours: true,
        }
    }

    #[test]
    fn test_cache_key_is_fixed_length_hex() {
        let key = CompletionRequest::new(Flow::General, "hola", context()).cache_key();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_cache_key_normalises_message() {
        let a = CompletionRequest::new(Flow::General, "  Horarios?  ", context());
        let b = CompletionRequest::new(Flow::General, "horarios?", context());
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_cache_key_ignores_volatile_context() {
        let a = CompletionRequest::new(Flow::General, "horarios?", context());
        let mut ctx = context();
        ctx.local_time = "23:59".to_string();
        ctx.previous_orders = 42;
        let b = CompletionRequest::new(Flow::General, "horarios?", ctx);
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_cache_key_depends_on_stable_fields() {
        let base = CompletionRequest::new(Flow::General, "horarios?", context());

        let other_flow = CompletionRequest::new(Flow::OrderTaking, "horarios?", context());
        assert_ne!(base.cache_key(), other_flow.cache_key());

        let mut ctx = context();
        ctx.zone = Zone::Sur;
        let other_zone = CompletionRequest::new(Flow::General, "horarios?", ctx);
        assert_ne!(base.cache_key(), other_zone.cache_key());

        let mut ctx = context();
        ctx.business_hours = false;
        let closed = CompletionRequest::new(Flow::General, "horarios?", ctx);
        assert_ne!(base.cache_key(), closed.cache_key());

        let mut ctx = context();
        ctx.customer_kind = CustomerKind::Vip;
        let vip = CompletionRequest::new(Flow::General, "horarios?", ctx);
        assert_ne!(base.cache_key(), vip.cache_key());
    }

    #[test]
    fn test_cache_key_ignores_budget_and_timeout() {
        let a = CompletionRequest::new(Flow::General, "menu", context());
        let b = a
            .clone()
            .with_max_tokens(100)
            .with_timeout(Duration::from_secs(2));
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_detect_flow() {
        assert_eq!(Flow::detect("¿Cuál es el estado de mi pedido?"), Flow::Confirmation);
        assert_eq!(Flow::detect("Quiero una pizza grande"), Flow::OrderTaking);
        assert_eq!(Flow::detect("Docena de EMPANADAS"), Flow::OrderTaking);
        assert_eq!(Flow::detect("¿Qué horario tienen?"), Flow::General);
        assert_eq!(Flow::detect("hola"), Flow::General);
    }

    #[test]
    fn test_zone_from_address() {
        assert_eq!(Zone::from_address("Calle 61 1234"), Zone::Centro);
        assert_eq!(Zone::from_address("Av. 80 y 45"), Zone::Norte);
        assert_eq!(Zone::from_address("Barrio Sur"), Zone::Sur);
        assert_eq!(Zone::from_address("Quequén"), Zone::FueraCobertura);
    }

    #[test]
    fn test_business_hours() {
        let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert!(is_business_hours(at(18, 0)));
        assert!(is_business_hours(at(23, 59)));
        assert!(is_business_hours(at(0, 30)));
        assert!(!is_business_hours(at(1, 0)));
        assert!(!is_business_hours(at(17, 59)));
    }

    #[test]
    fn test_context_at_formats_time() {
        let ctx = ConversationContext::at(
            CustomerKind::New,
            0,
            Zone::Norte,
            NaiveTime::from_hms_opt(9, 5, 0).unwrap(),
        );
        assert_eq!(ctx.local_time, "09:05");
        assert!(!ctx.business_hours);
    }

    #[test]
    fn test_user_content_embeds_context() {
        let content = CompletionRequest::new(Flow::General, "¿Tienen fugazzeta?", context()).user_content();
        assert!(content.starts_with("[CONTEXT]"));
        assert!(content.contains("Customer: returning (3 previous orders)"));
        assert!(content.contains("Zone: centro"));
        assert!(content.ends_with("[MESSAGE]\n¿Tienen fugazzeta?"));
    }

    #[test]
    fn test_flow_serde_names() {
        assert_eq!(serde_json::to_string(&Flow::OrderTaking).unwrap(), "\"order_taking\"");
        let zone: Zone = serde_json::from_str("\"fuera_cobertura\"").unwrap();
        assert_eq!(zone, Zone::FueraCobertura);
    }
}
