//! Short-TTL response cache shielding the upstream store from redundant reads.
//!
//! Process-local only: contents are lost on restart, which is fine because
//! the upstream store is the source of truth. Correctness requirement is
//! "no stale data for longer than the TTL after a write", enforced by the
//! coarse invalidation the write handlers perform.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::GateError;

/// Default freshness window for cached reads.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10);

struct CacheEntry {
    data: serde_json::Value,
    inserted: Instant,
}

/// Key-based cache of upstream JSON responses.
///
/// Concurrent `get_or_fetch` calls for the same key may both miss and both
/// fetch; that duplication is accepted. The map itself is race-free.
#[derive(Clone)]
pub struct ResponseCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value for `key` if still fresh, otherwise run the
    /// fetcher, store its result, and return it.
    ///
    /// Expired entries are swept on every call so the map cannot grow
    /// unboundedly between hits.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetcher: F) -> Result<serde_json::Value, GateError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<serde_json::Value, GateError>>,
    {
        self.sweep_expired();

        if let Some(entry) = self.entries.get(key) {
            if entry.inserted.elapsed() < self.ttl {
                tracing::debug!(cache_key = key, "cache hit");
                return Ok(entry.data.clone());
            }
        }

        tracing::debug!(cache_key = key, "cache miss, fetching upstream");
        let data = fetcher().await?;
        self.entries.insert(
            key.to_string(),
            CacheEntry { data: data.clone(), inserted: Instant::now() },
        );
        Ok(data)
    }

    /// Drop one key, or everything when `key` is `None`.
    ///
    /// Write handlers clear the whole cache: coarse, but it guarantees no
    /// read after a write can serve pre-write data.
    pub fn invalidate(&self, key: Option<&str>) {
        match key {
            Some(k) => {
                self.entries.remove(k);
            }
            None => self.entries.clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sweep_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.inserted.elapsed() < ttl);
    }
}
