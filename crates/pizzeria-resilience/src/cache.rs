//! Content-addressed cache of prior LLM responses.
//!
//! [`ResponseCache`] is fail-open: a missing or failing backing store turns
//! every lookup into a miss and every write into a no-op. Store errors are
//! logged and counted, never returned.
//!
//! - Default TTL: 1 hour, per entry
//! - In-memory store: `moka` with per-entry expiry, bounded capacity

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;

use crate::error::CacheError;
use crate::metrics::OutboundMetrics;

/// Default time-to-live for cached replies.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default in-memory capacity.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Metric label for this cache.
const CACHE_NAME: &str = "llm_response";

/// Backing storage for cached replies.
///
/// Implementations may fail (a remote tier can be down); the
/// [`ResponseCache`] wrapper absorbs every error.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Clone)]
struct CachedValue {
    value: Arc<str>,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, CachedValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Process-local store; expired entries read as absent.
#[derive(Clone)]
pub struct MemoryStore {
    cache: Cache<String, CachedValue>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }

    /// Number of live entries (approximate until pending maintenance runs).
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[async_trait]
impl ResponseStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.cache.get(key).await.map(|v| v.value.to_string()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.cache
            .insert(
                key.to_string(),
                CachedValue {
                    value: value.into(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}

/// Fail-open response cache.
#[derive(Clone)]
pub struct ResponseCache {
    store: Option<Arc<dyn ResponseStore>>,
    metrics: Option<Arc<OutboundMetrics>>,
}

impl ResponseCache {
    /// Cache backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ResponseStore>) -> Self {
        Self {
            store: Some(store),
            metrics: None,
        }
    }

    /// Cache backed by a fresh [`MemoryStore`].
    #[must_use]
    pub fn in_memory(max_entries: u64) -> Self {
        Self::new(Arc::new(MemoryStore::new(max_entries)))
    }

    /// A cache with no tier: every lookup misses, every write is dropped.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            store: None,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<OutboundMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Look up `key`. Store failures read as a miss.
    pub async fn get(&self, key: &str) -> Option<String> {
        let store = self.store.as_ref()?;

        let value = match store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(
                    target: "response_cache",
                    key_prefix = %key_prefix(key),
                    error = %e,
                    "Error reading response cache"
                );
                self.count_error("get");
                None
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_cache_lookup(CACHE_NAME, value.is_some());
        }
        if value.is_some() {
            tracing::debug!(
                target: "response_cache",
                key_prefix = %key_prefix(key),
                "Response cache hit"
            );
        }
        value
    }

    /// Store `value` under `key` for `ttl`. Store failures are swallowed.
    pub async fn set(&self, key: &str, value: String, ttl: Duration) {
        let Some(store) = self.store.as_ref() else {
            return;
        };

        match store.set(key, value, ttl).await {
            Ok(()) => tracing::debug!(
                target: "response_cache",
                key_prefix = %key_prefix(key),
                ttl_secs = ttl.as_secs(),
                "Response cached"
            ),
            Err(e) => {
                tracing::error!(
                    target: "response_cache",
                    key_prefix = %key_prefix(key),
                    error = %e,
                    "Error writing response cache"
                );
                self.count_error("set");
            }
        }
    }

    /// Drop `key` from the store. Store failures are swallowed.
    pub async fn invalidate(&self, key: &str) {
        let Some(store) = self.store.as_ref() else {
            return;
        };

        if let Err(e) = store.invalidate(key).await {
            tracing::error!(
                target: "response_cache",
                key_prefix = %key_prefix(key),
                error = %e,
                "Error invalidating response cache"
            );
            self.count_error("invalidate");
        }
    }

    fn count_error(&self, operation: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_error(CACHE_NAME, operation);
        }
    }
}

fn key_prefix(key: &str) -> &str {
    key.get(..12).unwrap_or(key)
}
