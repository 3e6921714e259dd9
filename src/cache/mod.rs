//! Two-tier response cache.
//!
//! [`TieredCache`] is the single place that knows how the tiers degrade:
//!
//! - **read**: ask the distributed tier first (bounded by a timeout). A
//!   hit there returns immediately without touching the local tier. A
//!   miss, an error or a timeout falls through to the local tier.
//! - **write**: attempt the distributed write, then write the local tier
//!   regardless of how the distributed write went, so recent answers
//!   stay servable if the distributed tier disappears later.
//!
//! Distributed-tier failures are logged and counted, never returned. The
//! worst a cache problem can do to a request is turn a hit into a miss.

pub mod local;

pub use local::{CacheEntry, LocalCache};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::fingerprint::Fingerprint;
use crate::providers::traits::DistributedCache;
use crate::{MimirError, telemetry};

/// Default key namespace in the distributed tier.
pub const DEFAULT_KEY_PREFIX: &str = "chat:";

/// Configuration for the cache tier.
///
/// ```rust
/// # use mimir::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .local_capacity(512)
///     .ttl(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Time-to-live for entries in both tiers. Default: 1 hour.
    pub ttl: Duration,
    /// Maximum entries in the local tier. Default: 1,000.
    pub local_capacity: u64,
    /// Timeout for each distributed-tier call. Default: 250ms.
    pub distributed_timeout: Duration,
    /// Prefix for distributed keys. Default: `"chat:"`.
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            local_capacity: 1_000,
            distributed_timeout: Duration::from_millis(250),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time-to-live for cached answers.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the local tier capacity.
    pub fn local_capacity(mut self, n: u64) -> Self {
        self.local_capacity = n;
        self
    }

    /// Set the per-call distributed timeout.
    pub fn distributed_timeout(mut self, timeout: Duration) -> Self {
        self.distributed_timeout = timeout;
        self
    }

    /// Set the distributed key prefix.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

/// Which tier served a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Distributed,
    Local,
}

impl CacheTier {
    fn label(self) -> &'static str {
        match self {
            CacheTier::Distributed => "distributed",
            CacheTier::Local => "local",
        }
    }
}

/// Distributed-first cache with a local LRU fallback.
///
/// Cheap to clone; clones share both tiers.
#[derive(Clone)]
pub struct TieredCache {
    distributed: Option<Arc<dyn DistributedCache>>,
    local: LocalCache,
    config: CacheConfig,
}

impl TieredCache {
    /// Local-only cache. Add a distributed tier with
    /// [`with_distributed`](Self::with_distributed).
    pub fn new(config: CacheConfig) -> Self {
        Self {
            distributed: None,
            local: LocalCache::new(config.local_capacity, config.ttl),
            config,
        }
    }

    /// Use `store` as the primary tier.
    pub fn with_distributed(mut self, store: Arc<dyn DistributedCache>) -> Self {
        self.distributed = Some(store);
        self
    }

    /// Whether a distributed tier is configured.
    pub fn has_distributed(&self) -> bool {
        self.distributed.is_some()
    }

    /// The local fallback tier.
    pub fn local(&self) -> &LocalCache {
        &self.local
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Distributed key for a fingerprint.
    pub fn distributed_key(&self, fingerprint: &Fingerprint) -> String {
        format!("{}{}", self.config.key_prefix, fingerprint.to_hex())
    }

    /// Look up an answer. Returns `None` on a miss in every reachable tier.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<String> {
        self.lookup(fingerprint).await.map(|(answer, _)| answer)
    }

    /// Like [`get`](Self::get), also reporting which tier answered.
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> Option<(String, CacheTier)> {
        if let Some(answer) = self.distributed_get(fingerprint).await {
            return Some(self.hit(fingerprint, answer, CacheTier::Distributed));
        }
        if let Some(entry) = self.local.get(fingerprint).await {
            return Some(self.hit(fingerprint, entry.answer, CacheTier::Local));
        }
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
        debug!(fingerprint = %fingerprint.short(), "cache miss");
        None
    }

    /// Store an answer in both tiers.
    pub async fn put(&self, fingerprint: &Fingerprint, answer: &str) {
        if let Some(store) = &self.distributed {
            let key = self.distributed_key(fingerprint);
            let result = tokio::time::timeout(
                self.config.distributed_timeout,
                store.set(&key, answer, self.config.ttl),
            )
            .await
            .unwrap_or_else(|_| Err(self.timeout_error()));
            if let Err(e) = result {
                self.record_failure(store.name(), "set", &e);
            }
        }
        self.local.insert(*fingerprint, answer).await;
        debug!(fingerprint = %fingerprint.short(), "cached answer");
    }

    async fn distributed_get(&self, fingerprint: &Fingerprint) -> Option<String> {
        let store = self.distributed.as_ref()?;
        let key = self.distributed_key(fingerprint);
        let result = tokio::time::timeout(self.config.distributed_timeout, store.get(&key))
            .await
            .unwrap_or_else(|_| Err(self.timeout_error()));
        match result {
            Ok(value) => value,
            Err(e) => {
                self.record_failure(store.name(), "get", &e);
                None
            }
        }
    }

    fn hit(&self, fingerprint: &Fingerprint, answer: String, tier: CacheTier) -> (String, CacheTier) {
        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tier" => tier.label()).increment(1);
        debug!(fingerprint = %fingerprint.short(), tier = tier.label(), "cache hit");
        (answer, tier)
    }

    fn timeout_error(&self) -> MimirError {
        MimirError::CacheUnavailable(format!(
            "timed out after {:?}",
            self.config.distributed_timeout
        ))
    }

    fn record_failure(&self, store: &str, op: &'static str, error: &MimirError) {
        metrics::counter!(telemetry::CACHE_ERRORS_TOTAL, "op" => op).increment(1);
        warn!(store, op, error = %error, "distributed cache unavailable, using local tier");
    }
}
