//! Site-wide views: the page index, the changes list, the interwiki
//! table and the maps.

use std::sync::Arc;

use serde_json::json;

use crate::application::access::AccessPolicy;
use crate::application::error::WikiError;
use crate::application::repos::PageStore;
use crate::application::settings::WikiSettings;
use crate::domain::entities::{GeoPoint, PageRecord};
use crate::domain::source::PageSource;
use crate::domain::types::Principal;
use crate::presentation::views::{
    ChangeEntry, InterwikiEntry, MapInfoWindowTemplate, MapInfoWindowView, PageLink,
    PagesMapView, SinglePageMapView, render_template,
};
use crate::util::{text, timezone, urls};

const CHANGES_LIMIT: u32 = 50;

/// Where a page with no stored location lands on the map.
const FALLBACK_LOCATION: GeoPoint = GeoPoint {
    lat: 61.72160269540121,
    lng: 94.21821875,
};

#[derive(Clone)]
pub struct SiteService {
    pages: Arc<dyn PageStore>,
    access: Arc<dyn AccessPolicy>,
}

impl SiteService {
    pub fn new(pages: Arc<dyn PageStore>, access: Arc<dyn AccessPolicy>) -> Self {
        Self { pages, access }
    }

    pub async fn page_index(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
    ) -> Result<Vec<PageLink>, WikiError> {
        self.check_can_list(settings, principal)?;
        let pages = self
            .pages
            .list_all()
            .await?
            .into_iter()
            .map(|page| PageLink {
                href: urls::page_href(&page.title),
                title: page.title,
            })
            .collect();
        Ok(pages)
    }

    pub async fn changes(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
    ) -> Result<Vec<ChangeEntry>, WikiError> {
        self.check_can_list(settings, principal)?;
        let tz = settings.timezone();
        let entries = self
            .pages
            .changes(CHANGES_LIMIT)
            .await?
            .into_iter()
            .map(|page| ChangeEntry {
                href: urls::page_href(&page.title),
                updated_display: timezone::display_datetime(page.updated_at, tz),
                author: page
                    .author_email
                    .as_deref()
                    .and_then(|email| email.split('@').next())
                    .unwrap_or("anonymous")
                    .to_string(),
                title: page.title,
            })
            .collect();
        Ok(entries)
    }

    pub fn interwiki(&self, settings: &WikiSettings) -> Vec<InterwikiEntry> {
        settings
            .interwiki()
            .into_iter()
            .map(|(name, pattern)| InterwikiEntry { name, pattern })
            .collect()
    }

    /// The map page for a single wiki page, centered on its stored
    /// location or on the fallback point when it has none yet.
    pub async fn single_page_map(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        title: &str,
    ) -> Result<SinglePageMapView, WikiError> {
        let record = self
            .pages
            .find_by_title(title)
            .await?
            .ok_or_else(|| WikiError::not_found("No such page."))?;
        if !self.access.can_read_page(settings, principal, &record) {
            return Err(WikiError::forbidden("You may not read this page."));
        }
        let point = record.geo.unwrap_or(FALLBACK_LOCATION);
        Ok(SinglePageMapView {
            title: record.title.clone(),
            page_url: urls::page_href(&record.title),
            lat: point.lat.to_string(),
            lng: point.lng.to_string(),
        })
    }

    pub fn label_map(&self, label: &str) -> PagesMapView {
        PagesMapView {
            label: label.to_string(),
            data_url: format!(
                "/w/pages/map-data?label={}",
                urls::encode_query_value(label)
            ),
        }
    }

    /// Marker data for every located page, as a script the map page can
    /// load directly: `var map_data = {...};`.
    pub async fn map_data(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        label: Option<&str>,
    ) -> Result<String, WikiError> {
        self.check_can_list(settings, principal)?;
        let pages: Vec<PageRecord> = self
            .pages
            .with_geo(label)
            .await?
            .into_iter()
            .filter(|page| self.access.can_read_page(settings, principal, page))
            .collect();

        let mut min_lat = 999.0_f64;
        let mut min_lng = 999.0_f64;
        let mut max_lat = 0.0_f64;
        let mut max_lng = 0.0_f64;
        let mut markers = Vec::with_capacity(pages.len());
        for page in &pages {
            let Some(point) = page.geo else {
                continue;
            };
            min_lat = min_lat.min(point.lat);
            min_lng = min_lng.min(point.lng);
            max_lat = max_lat.max(point.lat);
            max_lng = max_lng.max(point.lng);
            markers.push(json!({
                "lat": point.lat,
                "lng": point.lng,
                "title": page.title,
                "html": self.info_window(page)?,
            }));
        }

        let data = json!({
            "bounds": {
                "minlat": min_lat,
                "minlng": min_lng,
                "maxlat": max_lat,
                "maxlng": max_lng,
            },
            "markers": markers,
            "length": markers.len(),
        });
        Ok(format!("var map_data = {data};"))
    }

    fn info_window(&self, page: &PageRecord) -> Result<String, WikiError> {
        let source = PageSource::parse(&page.body);
        let view = MapInfoWindowView {
            title: source.name().unwrap_or(page.title.as_str()).to_string(),
            href: urls::page_href(&page.title),
            summary: text::cleanup_summary(source.body()),
        };
        Ok(render_template(MapInfoWindowTemplate { view })?.0)
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
