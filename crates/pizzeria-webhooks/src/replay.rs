//! Content-based replay suppression for inbound webhooks.
//!
//! A fingerprint is the SHA-256 of the raw body. Providers may resend an
//! identical payload without a stable identifier, so bodies are compared
//! byte for byte, never by parsed id. Fingerprints live for the window and
//! are purged on every check.

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

/// Default duplicate window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Remembers recently seen request bodies.
pub struct ReplayGuard {
    seen: DashMap<String, Instant>,
    window: Duration,
}

impl ReplayGuard {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            window,
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether `body` was already seen inside the window. A new body is
    /// recorded as a side effect.
    ///
    /// Check and insert happen under one shard lock, so two concurrent
    /// deliveries of the same body cannot both be admitted.
    pub fn is_duplicate(&self, body: &[u8]) -> bool {
        let now = Instant::now();
        self.purge_expired(now);

        match self.seen.entry(fingerprint(body)) {
            Entry::Occupied(mut seen_at) => {
                if now.duration_since(*seen_at.get()) <= self.window {
                    true
                } else {
                    seen_at.insert(now);
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                false
            }
        }
    }

    /// Drop the fingerprint of `body` so a redelivery is processed again.
    ///
    /// Used when an admitted body could not be handled.
    pub fn forget(&self, body: &[u8]) {
        self.seen.remove(&fingerprint(body));
    }

    /// Fingerprints currently remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn purge_expired(&self, now: Instant) {
        self.seen
            .retain(|_, seen_at| now.duration_since(*seen_at) <= self.window);
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl std::fmt::Debug for ReplayGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayGuard")
            .field("window", &self.window)
            .field("entries", &self.seen.len())
            .finish()
    }
}

/// Hex SHA-256 of a raw body.
#[must_use]
pub fn fingerprint(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_second_identical_body_is_duplicate() {
        let guard = ReplayGuard::default();
        assert!(!guard.is_duplicate(b"{\"id\":1}"));
        assert!(guard.is_duplicate(b"{\"id\":1}"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_byte_difference_is_not_duplicate() {
        let guard = ReplayGuard::default();
        assert!(!guard.is_duplicate(b"{\"id\":1}"));
        assert!(!guard.is_duplicate(b"{\"id\":2}"));
        assert!(!guard.is_duplicate(b"{\"id\": 1}"));
        assert_eq!(guard.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry() {
        let guard = ReplayGuard::default();
        assert!(!guard.is_duplicate(b"payload"));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(guard.is_duplicate(b"payload"));

        // the duplicate check does not refresh the timestamp
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!guard.is_duplicate(b"payload"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_purged_on_check() {
        let guard = ReplayGuard::new(Duration::from_secs(5));
        guard.is_duplicate(b"a");
        guard.is_duplicate(b"b");
        assert_eq!(guard.len(), 2);

        tokio::time::advance(Duration::from_secs(6)).await;
        guard.is_duplicate(b"c");
        assert_eq!(guard.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_releases_body() {
        let guard = ReplayGuard::default();
        assert!(!guard.is_duplicate(b"payload"));

        guard.forget(b"payload");
        assert!(guard.is_empty());
        assert!(!guard.is_duplicate(b"payload"));
        assert!(guard.is_duplicate(b"payload"));

        // unknown bodies are ignored
        guard.forget(b"other");
        assert_eq!(guard.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_identical_bodies_admitted_once() {
        for round in 0..50u32 {
            let guard = Arc::new(ReplayGuard::default());
            let body = format!("{{\"payment_id\":{round}}}");
            let barrier = Arc::new(tokio::sync::Barrier::new(16));

            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let guard = guard.clone();
                    let barrier = barrier.clone();
                    let body = body.clone();
                    tokio::spawn(async move {
                        barrier.wait().await;
                        guard.is_duplicate(body.as_bytes())
                    })
                })
                .collect();

            let mut fresh = 0;
            for handle in handles {
                if !handle.await.unwrap() {
                    fresh += 1;
                }
            }
            assert_eq!(fresh, 1, "round {round}");
            assert_eq!(guard.len(), 1);
        }
    }

    #[test]
    fn test_fingerprint_is_sha256_hex() {
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
