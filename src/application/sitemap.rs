//! Sitemap and robots.txt generation.

use std::sync::Arc;

use time::format_description::well_known::Rfc3339;

use crate::application::error::WikiError;
use crate::application::repos::PageStore;
use crate::util::{urls, xml::xml_escape};

#[derive(Clone)]
pub struct SitemapService {
    pages: Arc<dyn PageStore>,
    base_url: String,
}

impl SitemapService {
    pub fn new(pages: Arc<dyn PageStore>, base_url: String) -> Self {
        Self {
            pages,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// The sitemap covers only pages anyone can fetch, so it never gates
    /// on the requesting principal.
    pub async fn sitemap_xml(&self) -> Result<String, WikiError> {
        let pages = self.pages.list_public().await?;

        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
        );
        for page in &pages {
            let lastmod = page
                .updated_at
                .format(&Rfc3339)
                .unwrap_or_else(|_| page.updated_at.to_string());
            xml.push_str(&format!(
                "  <url>\n    <loc>{}{}</loc>\n    <lastmod>{}</lastmod>\n  </url>\n",
                self.base_url,
                xml_escape(&urls::page_href(&page.title)),
                lastmod
            ));
        }
        xml.push_str("</urlset>\n");
        Ok(xml)
    }

    pub fn robots_txt(&self) -> String {
        format!(
            "Sitemap: {}/sitemap.xml\nUser-agent: *\nDisallow: /static/\nDisallow: /w/\n",
            self.base_url
        )
    }
}
