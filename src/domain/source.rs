//! Page source format: a `key: value` property header, a `---` separator
//! and a markdown body.
//!
//! The header is optional. It is recognized only when a `---` line exists
//! and every non-blank line above it looks like a property, so ordinary
//! markdown that happens to contain a horizontal rule is left untouched.

use std::collections::BTreeMap;

use crate::domain::entities::GeoPoint;

/// Body used for `Label:` pages that have never been edited.
pub const DEFAULT_LABEL_BODY: &str = "name: {title}\n---\n# {title}\n\nPages in this category:\n\n[[List:{label}]]\n\n_This is an automatically generated page._\n";

/// Parsed page source: the property header plus the markdown text below it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageSource {
    properties: BTreeMap<String, String>,
    body: String,
}

impl PageSource {
    pub fn parse(text: &str) -> Self {
        let Some(separator) = text.lines().position(|line| line.trim_end() == "---") else {
            return Self::body_only(text);
        };

        let mut properties = BTreeMap::new();
        for line in text.lines().take(separator) {
            if line.trim().is_empty() {
                continue;
            }
            let Some((key, value)) = parse_property(line) else {
                return Self::body_only(text);
            };
            properties.insert(key.to_string(), value.to_string());
        }

        let body = text
            .lines()
            .skip(separator + 1)
            .collect::<Vec<_>>()
            .join("\n");
        Self { properties, body }
    }

    fn body_only(text: &str) -> Self {
        Self {
            properties: BTreeMap::new(),
            body: text.to_string(),
        }
    }

    /// Markdown text below the header.
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Display name override; falls back to the page title when absent.
    pub fn name(&self) -> Option<&str> {
        self.property("name").filter(|name| !name.is_empty())
    }

    pub fn labels(&self) -> Vec<String> {
        let Some(raw) = self.property("labels") else {
            return Vec::new();
        };
        raw.split(',')
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn redirect(&self) -> Option<&str> {
        self.property("redirect").filter(|target| !target.is_empty())
    }

    /// Content type used when the page is served in its raw form.
    pub fn content_type(&self) -> &str {
        self.property("content-type").unwrap_or("text/plain")
    }

    pub fn is_plain(&self) -> bool {
        self.property("format") == Some("plain")
    }

    pub fn is_public(&self) -> bool {
        self.property("public") == Some("yes")
    }

    pub fn is_private(&self) -> bool {
        self.property("private") == Some("yes")
    }

    pub fn map_label(&self) -> Option<&str> {
        self.property("map_label").filter(|label| !label.is_empty())
    }

    /// Coordinates from the `geo:` property, `lat, lng` with decimal degrees.
    pub fn geo(&self) -> Option<GeoPoint> {
        let raw = self.property("geo")?;
        let (lat, lng) = raw.split_once(',')?;
        Some(GeoPoint {
            lat: lat.trim().parse().ok()?,
            lng: lng.trim().parse().ok()?,
        })
    }
}

fn parse_property(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return None;
    }
    Some((key, value.trim()))
}

/// Body generated for an unsaved `Label:` page.
pub fn label_page_body(title: &str, label: &str) -> String {
    DEFAULT_LABEL_BODY
        .replace("{title}", title)
        .replace("{label}", label)
}

/// Editor prefill for a page that does not exist yet.
pub fn new_page_body(title: &str) -> String {
    format!("# {title}\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_body() {
        let source = PageSource::parse("name: Home\nlabels: news, misc\n---\n# Hello\n");
        assert_eq!(source.name(), Some("Home"));
        assert_eq!(source.labels(), vec!["news".to_string(), "misc".to_string()]);
        assert_eq!(source.body(), "# Hello");
    }

    #[test]
    fn treats_text_without_separator_as_body() {
        let source = PageSource::parse("just some text\nwith lines");
        assert_eq!(source.body(), "just some text\nwith lines");
        assert!(source.labels().is_empty());
    }

    #[test]
    fn leaves_markdown_rule_after_prose_alone() {
        let text = "Intro paragraph.\n\n---\n\nMore prose.";
        let source = PageSource::parse(text);
        assert_eq!(source.body(), text);
        assert_eq!(source.property("Intro paragraph."), None);
    }

    #[test]
    fn separator_on_first_line_gives_empty_header() {
        let source = PageSource::parse("---\nbody text");
        assert_eq!(source.body(), "body text");
        assert_eq!(source.name(), None);
    }

    #[test]
    fn parses_redirect_and_geo() {
        let source = PageSource::parse("redirect: Front Page\ngeo: 61.7, 94.2\n---\nsee elsewhere");
        assert_eq!(source.redirect(), Some("Front Page"));
        let geo = source.geo().unwrap();
        assert_eq!(geo.lat, 61.7);
        assert_eq!(geo.lng, 94.2);
    }

    #[test]
    fn malformed_geo_is_ignored() {
        let source = PageSource::parse("geo: north of here\n---\nbody");
        assert_eq!(source.geo(), None);
    }

    #[test]
    fn raw_content_type_defaults_to_text_plain() {
        let plain = PageSource::parse("body only");
        assert_eq!(plain.content_type(), "text/plain");

        let css = PageSource::parse("content-type: text/css\n---\nbody { color: red }");
        assert_eq!(css.content_type(), "text/css");
        assert_eq!(css.body(), "body { color: red }");
    }

    #[test]
    fn access_flags() {
        let source = PageSource::parse("public: yes\nformat: plain\n---\nx");
        assert!(source.is_public());
        assert!(!source.is_private());
        assert!(source.is_plain());
    }

    #[test]
    fn label_body_fills_title_and_label() {
        let body = label_page_body("Label:news", "news");
        assert!(body.starts_with("name: Label:news\n---\n# Label:news\n"));
        assert!(body.contains("[[List:news]]"));
    }
}
