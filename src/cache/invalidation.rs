//! Cache invalidation.
//!
//! Writes purge, they never recompute. Saving a page removes its four
//! page-scoped entries plus the label feed for every label involved in
//! the edit; the caller passes the union of labels before and after so
//! feeds a page just left are refreshed too. A global purge additionally
//! removes the site-wide entries and sweeps every stored page.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info};

use crate::application::repos::{PageStore, RepoError};

use super::keys::CacheKey;
use super::store::CacheStore;

pub(crate) const METRIC_CACHE_PURGE: &str = "quaderno_cache_purge_total";

pub struct InvalidationEngine {
    store: Arc<dyn CacheStore>,
    pages: Arc<dyn PageStore>,
}

impl InvalidationEngine {
    pub fn new(store: Arc<dyn CacheStore>, pages: Arc<dyn PageStore>) -> Self {
        Self { store, pages }
    }

    /// Removes every cache entry a page edit can have gone stale.
    ///
    /// Runs synchronously on the write path so a reader navigating to the
    /// page right after saving sees the new content.
    pub fn purge_page(&self, title: &str, labels: &[String]) {
        let mut removed: u64 = 0;
        for key in CacheKey::page_scoped(title) {
            self.store.delete(&key.to_string());
            removed += 1;
        }
        for label in labels {
            self.store
                .delete(&CacheKey::PagesFeed(label.clone()).to_string());
            removed += 1;
        }
        counter!(METRIC_CACHE_PURGE, "scope" => "page").increment(removed);
        debug!(title, labels = labels.len(), "Purged page cache entries");
    }

    /// Removes the site-wide entries and the entries of every page.
    ///
    /// Heavy on large wikis, which is why the HTTP layer runs it through
    /// the job queue rather than inline.
    pub async fn purge_all(&self) -> Result<(), RepoError> {
        for key in CacheKey::site_wide() {
            self.store.delete(&key.to_string());
        }
        counter!(METRIC_CACHE_PURGE, "scope" => "site")
            .increment(CacheKey::site_wide().len() as u64);

        let pages = self.pages.list_all().await?;
        info!(pages = pages.len(), "Purging cache entries for all pages");
        for page in &pages {
            self.purge_page(&page.title, &page.labels);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use time::OffsetDateTime;
    use uuid::Uuid;

    use crate::application::repos::SavePageParams;
    use crate::cache::config::CacheConfig;
    use crate::cache::store::{CachedContent, MemoryCacheStore};
    use crate::domain::entities::{PageRecord, RevisionRecord};

    use super::*;

    fn sample_page(title: &str, labels: &[&str]) -> PageRecord {
        PageRecord {
            id: Uuid::new_v4(),
            title: title.to_string(),
            body: String::new(),
            author_email: None,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            redirect: None,
            geo: None,
            is_public: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    struct StubPages {
        pages: Vec<PageRecord>,
    }

    #[async_trait]
    impl PageStore for StubPages {
        async fn find_by_title(&self, title: &str) -> Result<Option<PageRecord>, RepoError> {
            Ok(self.pages.iter().find(|p| p.title == title).cloned())
        }

        async fn list_all(&self) -> Result<Vec<PageRecord>, RepoError> {
            Ok(self.pages.clone())
        }

        async fn list_public(&self) -> Result<Vec<PageRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn recently_added(&self, _limit: u32) -> Result<Vec<PageRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn recent_by_label(
            &self,
            _label: &str,
            _limit: u32,
        ) -> Result<Vec<PageRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn by_label(&self, _label: &str) -> Result<Vec<PageRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn changes(&self, _limit: u32) -> Result<Vec<PageRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn with_geo(&self, _label: Option<&str>) -> Result<Vec<PageRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn find_revision(&self, _id: Uuid) -> Result<Option<RevisionRecord>, RepoError> {
            Ok(None)
        }

        async fn history(
            &self,
            _title: &str,
            _limit: u32,
        ) -> Result<Vec<RevisionRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn backlinks_for(&self, _title: &str) -> Result<Vec<String>, RepoError> {
            Ok(Vec::new())
        }

        async fn save_page(&self, _params: SavePageParams) -> Result<PageRecord, RepoError> {
            Err(RepoError::Persistence("read-only stub".to_string()))
        }

        async fn delete_page(&self, _title: &str) -> Result<bool, RepoError> {
            Ok(false)
        }
    }

    fn seeded_store(keys: &[&str]) -> Arc<MemoryCacheStore> {
        let store = Arc::new(MemoryCacheStore::new(&CacheConfig::default()));
        for key in keys {
            store.put(key.to_string(), CachedContent::html("stale"));
        }
        store
    }

    #[test]
    fn page_purge_fans_out_to_labels() {
        let store = seeded_store(&[
            "Page:Home",
            "RawPage:Home",
            "PageHistory:Home",
            "BackLinks:Home",
            "PagesFeed:featured",
            "Page:Other",
            "Index:",
        ]);
        let engine = InvalidationEngine::new(store.clone(), Arc::new(StubPages { pages: vec![] }));

        engine.purge_page("Home", &["featured".to_string()]);

        assert!(store.get("Page:Home").is_none());
        assert!(store.get("RawPage:Home").is_none());
        assert!(store.get("PageHistory:Home").is_none());
        assert!(store.get("BackLinks:Home").is_none());
        assert!(store.get("PagesFeed:featured").is_none());

        // Unrelated entries survive.
        assert!(store.get("Page:Other").is_some());
        assert!(store.get("Index:").is_some());
    }

    #[tokio::test]
    async fn global_purge_sweeps_every_page() {
        let store = seeded_store(&[
            "Index:",
            "IndexFeed:",
            "Sitemap:",
            "Changes:",
            "ChangesFeed:",
            "Page:Home",
            "Page:About",
            "PagesFeed:news",
        ]);
        let pages = Arc::new(StubPages {
            pages: vec![sample_page("Home", &[]), sample_page("About", &["news"])],
        });
        let engine = InvalidationEngine::new(store.clone(), pages);

        engine.purge_all().await.expect("purge all");

        assert!(store.is_empty());
    }
}
