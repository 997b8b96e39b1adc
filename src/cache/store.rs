//! Cache storage.
//!
//! The default backend keeps rendered content in an in-process LRU map.
//! The trait exists so a deployment can swap in a shared store without
//! touching resolution or invalidation logic.

use std::sync::Mutex;

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use tracing::debug;

use super::config::CacheConfig;
use super::lock::RecoverPoison;

pub(crate) const METRIC_CACHE_EVICT: &str = "quaderno_cache_evict_total";

/// A rendered response body together with the content type it was
/// produced under. Stored and replayed as-is, so repeated anonymous
/// requests are byte-identical.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedContent {
    pub content_type: String,
    pub body: Bytes,
}

impl CachedContent {
    pub fn new(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    pub fn html(body: impl Into<Bytes>) -> Self {
        Self::new("text/html", body)
    }
}

/// Keyed storage for rendered content.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<CachedContent>;
    fn put(&self, key: String, content: CachedContent);
    fn delete(&self, key: &str);
    fn clear(&self);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process LRU cache store.
pub struct MemoryCacheStore {
    entries: Mutex<LruCache<String, CachedContent>>,
    max_body_bytes: usize,
}

impl MemoryCacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.entry_limit_non_zero())),
            max_body_bytes: config.max_body_bytes,
        }
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Option<CachedContent> {
        self.entries.lock_recovering("get").get(key).cloned()
    }

    fn put(&self, key: String, content: CachedContent) {
        if content.body.len() > self.max_body_bytes {
            debug!(
                key,
                body_bytes = content.body.len(),
                limit = self.max_body_bytes,
                "Skipping oversized cache entry"
            );
            return;
        }
        let evicted = self.entries.lock_recovering("put").push(key, content);
        if let Some((evicted_key, _)) = evicted {
            counter!(METRIC_CACHE_EVICT).increment(1);
            debug!(key = evicted_key, "Evicted cache entry at capacity");
        }
    }

    fn delete(&self, key: &str) {
        self.entries.lock_recovering("delete").pop(key);
    }

    fn clear(&self) {
        self.entries.lock_recovering("clear").clear();
    }

    fn len(&self) -> usize {
        self.entries.lock_recovering("len").len()
    }
}
