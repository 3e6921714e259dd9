//! Bounded in-process fallback tier.

use std::time::{Duration, SystemTime};

use moka::future::Cache;
use moka::policy::EvictionPolicy;

use crate::fingerprint::Fingerprint;

/// A cached answer with its creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub answer: String,
    pub created_at: SystemTime,
}

/// In-memory LRU + TTL map keyed by fingerprint.
///
/// Backed by moka with the LRU eviction policy; moka synchronises
/// internally, so concurrent `get`/`insert` from many requests never
/// corrupt the recency order. Entries older than the TTL are never
/// returned, even before they are physically evicted.
#[derive(Clone)]
pub struct LocalCache {
    entries: Cache<Fingerprint, CacheEntry>,
}

impl LocalCache {
    /// Create a cache holding at most `capacity` entries for `ttl` each.
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { entries }
    }

    /// Look up a live entry.
    pub async fn get(&self, key: &Fingerprint) -> Option<CacheEntry> {
        self.entries.get(key).await
    }

    /// Insert (or overwrite) the answer for `key`.
    pub async fn insert(&self, key: Fingerprint, answer: impl Into<String>) {
        let entry = CacheEntry {
            answer: answer.into(),
            created_at: SystemTime::now(),
        };
        self.entries.insert(key, entry).await;
    }

    /// Drop one entry.
    pub async fn invalidate(&self, key: &Fingerprint) {
        self.entries.invalidate(key).await;
    }

    /// Approximate number of live entries.
    ///
    /// moka applies evictions lazily; call [`sync`](Self::sync) first for
    /// an up-to-date count.
    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply pending evictions and expirations.
    pub async fn sync(&self) {
        self.entries.run_pending_tasks().await;
    }
}
