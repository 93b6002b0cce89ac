//! Application configuration loaded from environment variables.
//!
//! Loading is fail-fast: a variable that is set but cannot be parsed stops
//! startup with a [`ConfigError`]. Unset variables take their defaults. A
//! `.env` file is honoured in development.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use pizzeria_resilience::anthropic::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use pizzeria_resilience::{AnthropicConfig, BackoffPolicy, CircuitBreakerConfig, InvokerConfig};
use pizzeria_webhooks::{AllowList, ProviderPolicy, WebhookProvider};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(var: &str, message: impl fmt::Display) -> Self {
        Self::InvalidValue {
            var: var.to_string(),
            message: message.to_string(),
        }
    }
}

/// Webhook settings for one provider.
#[derive(Clone)]
pub struct ProviderSettings {
    /// HMAC secret; unset disables the signature check.
    pub secret: Option<String>,
    pub allow_list: AllowList,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("allow_list", &self.allow_list.to_string())
            .finish()
    }
}

impl ProviderSettings {
    #[must_use]
    pub fn policy(&self) -> ProviderPolicy {
        ProviderPolicy {
            allow_list: self.allow_list.clone(),
            secret: self.secret.clone(),
        }
    }
}

/// Application configuration.
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub rust_log: String,

    /// Anthropic API key. Without it every assistant reply degrades.
    pub anthropic_api_key: Option<String>,
    pub claude_model: String,
    pub anthropic_base_url: String,
    pub max_tokens_per_session: u32,

    pub llm_max_attempts: u32,
    pub llm_base_backoff: Duration,
    pub llm_max_backoff: Duration,
    pub llm_max_jitter: Duration,
    pub llm_request_timeout: Duration,

    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub cache_max_entries: u64,

    pub breaker_threshold: u32,
    pub breaker_cool_down: Duration,

    pub replay_window: Duration,
    pub webhooks: HashMap<WebhookProvider, ProviderSettings>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("rust_log", &self.rust_log)
            .field(
                "anthropic_api_key",
                &self.anthropic_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("claude_model", &self.claude_model)
            .field("anthropic_base_url", &self.anthropic_base_url)
            .field("max_tokens_per_session", &self.max_tokens_per_session)
            .field("llm_max_attempts", &self.llm_max_attempts)
            .field("llm_request_timeout", &self.llm_request_timeout)
            .field("cache_enabled", &self.cache_enabled)
            .field("cache_ttl", &self.cache_ttl)
            .field("breaker_threshold", &self.breaker_threshold)
            .field("breaker_cool_down", &self.breaker_cool_down)
            .field("replay_window", &self.replay_window)
            .field("webhooks", &self.webhooks)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Variables:
    /// - `HOST` / `PORT` - bind address (default: 0.0.0.0:3000)
    /// - `RUST_LOG` - log filter (default: info)
    /// - `ANTHROPIC_API_KEY`, `CLAUDE_MODEL`, `ANTHROPIC_BASE_URL`
    /// - `MAX_TOKENS_PER_SESSION` (default: 6600)
    /// - `LLM_MAX_ATTEMPTS`, `LLM_BASE_BACKOFF_MS`, `LLM_MAX_BACKOFF_MS`,
    ///   `LLM_MAX_JITTER_MS`, `LLM_REQUEST_TIMEOUT_MS`
    /// - `LLM_CACHE_ENABLED`, `LLM_CACHE_TTL_SECS`, `LLM_CACHE_MAX_ENTRIES`
    /// - `CIRCUIT_BREAKER_THRESHOLD`, `CIRCUIT_BREAKER_COOLDOWN_MS`
    /// - `WEBHOOK_REPLAY_WINDOW_SECS` (default: 60)
    /// - `<PROVIDER>_WEBHOOK_SECRET`, `<PROVIDER>_ALLOWED_IPS` for
    ///   `CHATWOOT`, `MODO`, `MERCADOPAGO`
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development only)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let anthropic_api_key = get("ANTHROPIC_API_KEY");
        if let Some(key) = &anthropic_api_key {
            if !key.starts_with("sk-ant-") {
                return Err(ConfigError::invalid(
                    "ANTHROPIC_API_KEY",
                    "expected a key starting with sk-ant-",
                ));
            }
        }

        let llm_max_attempts: u32 = parse_or(&get, "LLM_MAX_ATTEMPTS", 3)?;
        if llm_max_attempts == 0 {
            return Err(ConfigError::invalid("LLM_MAX_ATTEMPTS", "must be at least 1"));
        }
        let breaker_threshold: u32 = parse_or(&get, "CIRCUIT_BREAKER_THRESHOLD", 5)?;
        if breaker_threshold == 0 {
            return Err(ConfigError::invalid(
                "CIRCUIT_BREAKER_THRESHOLD",
                "must be at least 1",
            ));
        }

        let mut webhooks = HashMap::new();
        for provider in WebhookProvider::ALL {
            let prefix = provider.env_prefix();
            let ips_var = format!("{prefix}_ALLOWED_IPS");
            let allow_list = match get(&ips_var) {
                Some(list) => {
                    AllowList::parse(&list).map_err(|e| ConfigError::invalid(&ips_var, e))?
                }
                None => provider.default_allow_list(),
            };
            webhooks.insert(
                provider,
                ProviderSettings {
                    secret: get(&format!("{prefix}_WEBHOOK_SECRET")),
                    allow_list,
                },
            );
        }

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", 3000)?,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            anthropic_api_key,
            claude_model: get("CLAUDE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            anthropic_base_url: get("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_tokens_per_session: parse_or(&get, "MAX_TOKENS_PER_SESSION", 6600)?,
            llm_max_attempts,
            llm_base_backoff: millis_or(&get, "LLM_BASE_BACKOFF_MS", 1000)?,
            llm_max_backoff: millis_or(&get, "LLM_MAX_BACKOFF_MS", 10_000)?,
            llm_max_jitter: millis_or(&get, "LLM_MAX_JITTER_MS", 1000)?,
            llm_request_timeout: millis_or(&get, "LLM_REQUEST_TIMEOUT_MS", 30_000)?,
            cache_enabled: bool_or(&get, "LLM_CACHE_ENABLED", true)?,
            cache_ttl: Duration::from_secs(parse_or(&get, "LLM_CACHE_TTL_SECS", 3600)?),
            cache_max_entries: parse_or(&get, "LLM_CACHE_MAX_ENTRIES", 10_000)?,
            breaker_threshold,
            breaker_cool_down: millis_or(&get, "CIRCUIT_BREAKER_COOLDOWN_MS", 60_000)?,
            replay_window: Duration::from_secs(parse_or(&get, "WEBHOOK_REPLAY_WINDOW_SECS", 60)?),
            webhooks,
        })
    }

    /// Socket address string for the listener.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Anthropic client settings, when a key is configured.
    #[must_use]
    pub fn anthropic(&self) -> Option<AnthropicConfig> {
        self.anthropic_api_key.as_ref().map(|key| {
            AnthropicConfig::new(key.clone())
                .with_model(self.claude_model.clone())
                .with_base_url(self.anthropic_base_url.clone())
        })
    }

    #[must_use]
    pub fn invoker(&self) -> InvokerConfig {
        InvokerConfig::default()
            .with_max_attempts(self.llm_max_attempts)
            .with_request_timeout(self.llm_request_timeout)
            .with_cache_ttl(self.cache_ttl)
            .with_max_tokens_per_session(self.max_tokens_per_session)
    }

    #[must_use]
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.llm_base_backoff, self.llm_max_backoff, self.llm_max_jitter)
    }

    #[must_use]
    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::default()
            .with_failure_threshold(self.breaker_threshold)
            .with_cool_down(self.breaker_cool_down)
    }

    /// Webhook policy for `provider`, falling back to the published defaults.
    #[must_use]
    pub fn webhook_policy(&self, provider: WebhookProvider) -> ProviderPolicy {
        self.webhooks
            .get(&provider)
            .map_or_else(|| ProviderPolicy::defaults_for(provider), ProviderSettings::policy)
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(var) {
        Some(raw) => raw.parse().map_err(|e| ConfigError::invalid(var, e)),
        None => Ok(default),
    }
}

fn millis_or(
    get: &impl Fn(&str) -> Option<String>,
    var: &str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    parse_or(get, var, default_ms).map(Duration::from_millis)
}

fn bool_or(
    get: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match get(var).map(|v| v.to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            other => Err(ConfigError::invalid(var, format!("not a boolean: {other}"))),
        },
    }
}
