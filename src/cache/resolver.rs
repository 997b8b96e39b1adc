//! Cache-aside content resolution.

use std::future::Future;
use std::sync::Arc;

use metrics::counter;
use tracing::debug;

use crate::application::error::WikiError;
use crate::domain::types::Principal;

use super::keys::CacheKey;
use super::store::{CacheStore, CachedContent};

pub(crate) const METRIC_CACHE_HIT: &str = "quaderno_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "quaderno_cache_miss_total";
pub(crate) const METRIC_CACHE_BYPASS: &str = "quaderno_cache_bypass_total";

/// Resolves cacheable content: served from the store for signed-out
/// visitors, recomputed for everyone else.
///
/// Two anonymous requests racing on a cold key may compute the same
/// content twice; the results are identical and the last write wins, so
/// no cross-request coordination is attempted.
pub struct ContentResolver {
    store: Arc<dyn CacheStore>,
    enabled: bool,
}

impl ContentResolver {
    pub fn new(store: Arc<dyn CacheStore>, enabled: bool) -> Self {
        Self { store, enabled }
    }

    /// Returns the content under `key`, computing and storing it on a miss.
    ///
    /// Signed-in visitors always recompute and never populate the store:
    /// their responses can carry personalised chrome.
    pub async fn resolve<Fut>(
        &self,
        key: CacheKey,
        principal: &Principal,
        compute: Fut,
    ) -> Result<CachedContent, WikiError>
    where
        Fut: Future<Output = Result<CachedContent, WikiError>>,
    {
        if !self.enabled || !principal.is_anonymous() {
            counter!(METRIC_CACHE_BYPASS).increment(1);
            return compute.await;
        }

        let key = key.to_string();
        if let Some(content) = self.store.get(&key) {
            counter!(METRIC_CACHE_HIT).increment(1);
            debug!(key, outcome = "hit", "Serving cached content");
            return Ok(content);
        }

        counter!(METRIC_CACHE_MISS).increment(1);
        debug!(key, outcome = "miss", "Computing content");
        let content = compute.await?;
        self.store.put(key, content.clone());
        Ok(content)
    }
}
