//! Cache key definitions.
//!
//! Every cacheable resource has a stable string key. Per-page resources
//! embed the page title; site-wide resources are bare prefixes. The string
//! forms are load-bearing: invalidation deletes by these exact strings.

use std::fmt;

/// Identifies one cacheable resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Rendered HTML view of a page.
    Page(String),
    /// Raw page body served with its declared content type.
    RawPage(String),
    /// Rendered view of one historical revision. Revisions never change,
    /// so this key is not part of any purge set.
    PageRevision(String),
    /// Rendered revision history of a page.
    PageHistory(String),
    /// Rendered list of pages linking to a page.
    BackLinks(String),
    /// Atom feed of pages carrying one label.
    PagesFeed(String),
    /// Rendered list of all pages.
    Index,
    /// Atom feed of recently added pages.
    IndexFeed,
    /// XML sitemap.
    Sitemap,
    /// Rendered list of recent changes.
    Changes,
    /// Feed of recent changes.
    ChangesFeed,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Page(title) => write!(f, "Page:{title}"),
            CacheKey::RawPage(title) => write!(f, "RawPage:{title}"),
            CacheKey::PageRevision(id) => write!(f, "PageRevision:{id}"),
            CacheKey::PageHistory(title) => write!(f, "PageHistory:{title}"),
            CacheKey::BackLinks(title) => write!(f, "BackLinks:{title}"),
            CacheKey::PagesFeed(label) => write!(f, "PagesFeed:{label}"),
            CacheKey::Index => write!(f, "Index:"),
            CacheKey::IndexFeed => write!(f, "IndexFeed:"),
            CacheKey::Sitemap => write!(f, "Sitemap:"),
            CacheKey::Changes => write!(f, "Changes:"),
            CacheKey::ChangesFeed => write!(f, "ChangesFeed:"),
        }
    }
}

impl CacheKey {
    /// Keys scoped to a single page, not counting label feeds.
    pub fn page_scoped(title: &str) -> [CacheKey; 4] {
        [
            CacheKey::Page(title.to_string()),
            CacheKey::RawPage(title.to_string()),
            CacheKey::PageHistory(title.to_string()),
            CacheKey::BackLinks(title.to_string()),
        ]
    }

    /// Site-wide keys removed by a global purge.
    pub fn site_wide() -> [CacheKey; 5] {
        [
            CacheKey::Index,
            CacheKey::IndexFeed,
            CacheKey::Sitemap,
            CacheKey::Changes,
            CacheKey::ChangesFeed,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_keys_embed_title_verbatim() {
        assert_eq!(CacheKey::Page("Home".to_string()).to_string(), "Page:Home");
        assert_eq!(
            CacheKey::RawPage("Front Page".to_string()).to_string(),
            "RawPage:Front Page"
        );
        assert_eq!(
            CacheKey::PageHistory("Home".to_string()).to_string(),
            "PageHistory:Home"
        );
        assert_eq!(
            CacheKey::BackLinks("Home".to_string()).to_string(),
            "BackLinks:Home"
        );
        assert_eq!(
            CacheKey::PagesFeed("news".to_string()).to_string(),
            "PagesFeed:news"
        );
    }

    #[test]
    fn site_wide_keys_are_bare_prefixes() {
        let keys: Vec<String> = CacheKey::site_wide()
            .iter()
            .map(CacheKey::to_string)
            .collect();
        assert_eq!(
            keys,
            vec!["Index:", "IndexFeed:", "Sitemap:", "Changes:", "ChangesFeed:"]
        );
    }

    #[test]
    fn titles_with_colons_stay_distinct() {
        let label_page = CacheKey::Page("Label:news".to_string());
        let feed = CacheKey::PagesFeed("news".to_string());
        assert_ne!(label_page.to_string(), feed.to_string());
    }

    #[test]
    fn revision_keys_are_outside_the_page_purge_set() {
        let purged = CacheKey::page_scoped("Home");
        let revision = CacheKey::PageRevision("5f2b".to_string());
        assert!(!purged.contains(&revision));
        assert_eq!(revision.to_string(), "PageRevision:5f2b");
    }
}
