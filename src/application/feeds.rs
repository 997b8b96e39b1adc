//! Feed generation.
//!
//! The index and label feeds are Atom, the change log feed is RSS 2.0.
//! All three are built by hand: the shapes are small and fixed, and a
//! templating pass would only obscure the escaping rules.

use std::sync::Arc;

use time::OffsetDateTime;
use time::format_description::well_known::{Rfc2822, Rfc3339};

use crate::application::access::AccessPolicy;
use crate::application::error::WikiError;
use crate::application::repos::PageStore;
use crate::application::settings::WikiSettings;
use crate::domain::entities::PageRecord;
use crate::domain::source::PageSource;
use crate::domain::types::Principal;
use crate::util::{text, urls, xml::xml_escape};

const FEED_LIMIT: u32 = 20;

#[derive(Clone)]
pub struct FeedService {
    pages: Arc<dyn PageStore>,
    access: Arc<dyn AccessPolicy>,
    base_url: String,
}

impl FeedService {
    pub fn new(pages: Arc<dyn PageStore>, access: Arc<dyn AccessPolicy>, base_url: String) -> Self {
        Self {
            pages,
            access,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Atom feed of recently added pages.
    pub async fn index_feed(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
    ) -> Result<String, WikiError> {
        self.check_can_list(settings, principal)?;
        let pages = self.pages.recently_added(FEED_LIMIT).await?;
        Ok(self.atom_feed(
            settings.site_title(),
            &format!("{}/w/index.rss", self.base_url),
            &pages,
        ))
    }

    /// Atom feed of recently added pages carrying one label.
    pub async fn label_feed(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        label: &str,
    ) -> Result<String, WikiError> {
        self.check_can_list(settings, principal)?;
        let pages = self.pages.recent_by_label(label, FEED_LIMIT).await?;
        let title = format!("{}: {}", settings.site_title(), label);
        let self_url = format!(
            "{}/w/pages.rss?label={}",
            self.base_url,
            urls::encode_query_value(label)
        );
        Ok(self.atom_feed(&title, &self_url, &pages))
    }

    /// RSS feed of recently changed pages.
    pub async fn changes_feed(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
    ) -> Result<String, WikiError> {
        self.check_can_list(settings, principal)?;
        let pages = self.pages.changes(FEED_LIMIT).await?;

        let mut items = String::new();
        for page in &pages {
            let link = self.page_url(page);
            let pub_date = page
                .updated_at
                .format(&Rfc2822)
                .unwrap_or_else(|_| page.updated_at.to_string());
            items.push_str(&format!(
                "    <item>\n      <title>{}</title>\n      <link>{}</link>\n      <guid>{}</guid>\n      <pubDate>{}</pubDate>\n      <description><![CDATA[{}]]></description>\n    </item>\n",
                xml_escape(&page.title),
                link,
                link,
                pub_date,
                summary(page),
            ));
        }

        Ok(format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\">\n  <channel>\n    <title>{}</title>\n    <link>{}/</link>\n    <description>Recent changes</description>\n{}  </channel>\n</rss>\n",
            xml_escape(settings.site_title()),
            self.base_url,
            items
        ))
    }

    fn atom_feed(&self, title: &str, self_url: &str, pages: &[PageRecord]) -> String {
        let updated = pages
            .iter()
            .map(|page| page.updated_at)
            .max()
            .unwrap_or_else(OffsetDateTime::now_utc);
        let updated = updated
            .format(&Rfc3339)
            .unwrap_or_else(|_| updated.to_string());

        let mut entries = String::new();
        for page in pages {
            let link = self.page_url(page);
            let entry_updated = page
                .updated_at
                .format(&Rfc3339)
                .unwrap_or_else(|_| page.updated_at.to_string());
            let author = page
                .author_email
                .as_deref()
                .and_then(|email| email.split('@').next())
                .unwrap_or("anonymous");
            entries.push_str(&format!(
                "  <entry>\n    <title>{}</title>\n    <link href=\"{}\"/>\n    <id>{}</id>\n    <updated>{}</updated>\n    <author><name>{}</name></author>\n    <summary><![CDATA[{}]]></summary>\n  </entry>\n",
                xml_escape(&page.title),
                link,
                link,
                entry_updated,
                xml_escape(author),
                summary(page),
            ));
        }

        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<feed xmlns=\"http://www.w3.org/2005/Atom\">\n  <title>{}</title>\n  <id>{}/</id>\n  <updated>{}</updated>\n  <link href=\"{}\" rel=\"self\"/>\n{}</feed>\n",
            xml_escape(title),
            self.base_url,
            updated,
            self_url,
            entries
        )
    }

    fn page_url(&self, page: &PageRecord) -> String {
        format!("{}{}", self.base_url, urls::page_href(&page.title))
    }

    fn check_can_list(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
    ) -> Result<(), WikiError> {
        if self.access.can_list_pages(settings, principal) {
            Ok(())
        } else {
            Err(WikiError::forbidden("This wiki is private."))
        }
    }
}

fn summary(page: &PageRecord) -> String {
    text::cleanup_summary(PageSource::parse(&page.body).body())
}
