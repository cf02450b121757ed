//! TTL cache for raw catalog responses
//!
//! Entries are keyed by `"pokeapi:<endpoint>"` and hold the decoded JSON body.
//! There is no explicit invalidation: an entry expires once its TTL has
//! elapsed and is evicted by the cache's own housekeeping.

use std::time::{Duration, Instant};

use moka::sync::Cache;
use moka::Expiry;
use serde_json::Value;

/// Namespace prefix for every catalog cache key
pub const CACHE_NAMESPACE: &str = "pokeapi";

/// Upper bound on cached responses; least recently used entries go first.
const MAX_ENTRIES: u64 = 10_000;

/// Builds the cache key for an upstream endpoint path (with query string).
pub fn cache_key(endpoint: &str) -> String {
    format!("{}:{}", CACHE_NAMESPACE, endpoint)
}

/// Shared response cache
///
/// Implementations must be safe for concurrent use from many requests.
/// Keys are independent; concurrent `set` calls on one key are last-writer-wins.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value, ttl: Duration);
}

#[derive(Clone)]
struct CachedValue {
    value: Value,
    ttl: Duration,
}

/// Each entry lives for the TTL it was written with.
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

/// In-process [`ResponseCache`] backed by a bounded `moka` cache
pub struct MemoryCache {
    entries: Cache<String, CachedValue>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries after pending evictions have run.
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        usize::try_from(self.entries.entry_count()).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|cached| cached.value)
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.entries.insert(key.to_string(), CachedValue { value, ttl });
    }
}
