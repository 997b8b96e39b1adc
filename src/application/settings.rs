//! Wiki settings stored in the `wiki:settings` page.
//!
//! Settings are ordinary page properties, so admins edit them through the
//! wiki itself. Loading falls back to defaults when the page is missing,
//! which is the state of a freshly created wiki.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono_tz::Tz;
use tracing::warn;

use crate::application::repos::{PageStore, RepoError};
use crate::domain::source::PageSource;

/// Title of the page holding the settings.
pub const SETTINGS_PAGE_TITLE: &str = "wiki:settings";

/// Reserved prefix for infrastructure pages (settings, sidebar, footer,
/// error pages). Only admins may edit pages under it.
pub const RESERVED_PREFIX: &str = "wiki:";

const DEFAULT_SITE_TITLE: &str = "Wiki";
const DEFAULT_START_PAGE: &str = "Welcome";
const DEFAULT_SIDEBAR_PAGE: &str = "wiki:sidebar";
const DEFAULT_FOOTER_PAGE: &str = "wiki:footer";

/// Typed view over the settings page properties.
#[derive(Debug, Clone, Default)]
pub struct WikiSettings {
    source: PageSource,
}

impl WikiSettings {
    pub fn from_body(body: &str) -> Self {
        Self {
            source: PageSource::parse(body),
        }
    }

    /// Site name shown in the chrome and in feed titles.
    pub fn site_title(&self) -> &str {
        self.source
            .property("title")
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_SITE_TITLE)
    }

    /// Page served at `/`.
    pub fn start_page(&self) -> &str {
        self.source
            .property("start_page")
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_START_PAGE)
    }

    /// Page whose body renders as the sidebar.
    pub fn sidebar_page(&self) -> &str {
        self.source
            .property("sidebar")
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_SIDEBAR_PAGE)
    }

    /// Page whose body renders as the footer.
    pub fn footer_page(&self) -> &str {
        self.source
            .property("footer")
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_FOOTER_PAGE)
    }

    /// Timezone used when formatting timestamps for display.
    pub fn timezone(&self) -> Tz {
        let Some(name) = self.source.property("timezone") else {
            return Tz::UTC;
        };
        match name.parse() {
            Ok(tz) => tz,
            Err(_) => {
                warn!(timezone = name, "Unknown timezone in settings, using UTC");
                Tz::UTC
            }
        }
    }

    /// Whether signed-out visitors may read regular pages.
    pub fn open_reading(&self) -> bool {
        self.source.property("open-reading") != Some("no")
    }

    /// Whether any signed-in user may edit pages.
    pub fn open_editing(&self) -> bool {
        self.source.property("open-editing") == Some("yes")
    }

    pub fn map_enabled(&self) -> bool {
        self.source.property("enable-map") == Some("yes")
    }

    /// Emails granted editing rights regardless of per-user flags.
    pub fn editors(&self) -> Vec<String> {
        let Some(raw) = self.source.property("editors") else {
            return Vec::new();
        };
        raw.split(',')
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Interwiki link patterns, keyed by scheme name. The pattern embeds
    /// `%s` where the target should go.
    pub fn interwiki(&self) -> BTreeMap<String, String> {
        self.source
            .properties()
            .filter_map(|(key, value)| {
                key.strip_prefix("interwiki-")
                    .map(|name| (name.to_string(), value.to_string()))
            })
            .collect()
    }
}

/// Loads settings from the page store on demand.
///
/// The settings page is a single keyed lookup; keeping a separate settings
/// cache would just add one more thing edits have to invalidate.
pub struct SettingsService {
    pages: Arc<dyn PageStore>,
}

impl SettingsService {
    pub fn new(pages: Arc<dyn PageStore>) -> Self {
        Self { pages }
    }

    pub async fn load(&self) -> Result<WikiSettings, RepoError> {
        let page = self.pages.find_by_title(SETTINGS_PAGE_TITLE).await?;
        Ok(page
            .map(|page| WikiSettings::from_body(&page.body))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_for_missing_page() {
        let settings = WikiSettings::default();
        assert_eq!(settings.site_title(), "Wiki");
        assert_eq!(settings.start_page(), "Welcome");
        assert_eq!(settings.sidebar_page(), "wiki:sidebar");
        assert_eq!(settings.footer_page(), "wiki:footer");
        assert_eq!(settings.timezone(), Tz::UTC);
        assert!(settings.open_reading());
        assert!(!settings.open_editing());
        assert!(!settings.map_enabled());
        assert!(settings.editors().is_empty());
        assert!(settings.interwiki().is_empty());
    }

    #[test]
    fn reads_properties_from_body() {
        let settings = WikiSettings::from_body(
            "start_page: Front Page\ntimezone: Europe/Helsinki\nopen-reading: no\nopen-editing: yes\neditors: a@example.com, b@example.com\ninterwiki-wp: https://en.wikipedia.org/wiki/%s\n---\nSettings live here.\n",
        );
        assert_eq!(settings.start_page(), "Front Page");
        assert_eq!(settings.timezone(), Tz::Europe__Helsinki);
        assert!(!settings.open_reading());
        assert!(settings.open_editing());
        assert_eq!(
            settings.editors(),
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );
        assert_eq!(
            settings.interwiki().get("wp").map(String::as_str),
            Some("https://en.wikipedia.org/wiki/%s")
        );
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let settings = WikiSettings::from_body("timezone: Mars/Olympus\n---\n");
        assert_eq!(settings.timezone(), Tz::UTC);
    }
}
