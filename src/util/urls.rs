//! URL construction for pages, labels and auth flows.
//!
//! Page URLs substitute underscores for spaces before percent-encoding,
//! so `/Front_Page` addresses the page titled "Front Page". Slashes stay
//! literal: they are part of hierarchical titles.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Everything except unreserved characters and `/`.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

pub fn encode_path(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

pub fn encode_query_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Canonical URL of a page.
pub fn page_href(title: &str) -> String {
    format!("/{}", encode_path(&title.replace(' ', "_")))
}

/// URL of the listing page for a label.
pub fn label_href(label: &str) -> String {
    page_href(&format!("Label:{label}"))
}

pub fn edit_href(title: &str) -> String {
    format!("/w/edit?page={}", encode_query_value(title))
}

/// Login URL that returns the visitor to `current_path` afterwards.
pub fn login_href(current_path: &str) -> String {
    format!("/w/login?back={}", encode_query_value(current_path))
}

pub fn logout_href(current_path: &str) -> String {
    format!("/w/logout?back={}", encode_query_value(current_path))
}

/// Host part of a URL with any `www.` prefix dropped, for display.
pub fn display_hostname(url: &str) -> String {
    let host = url
        .split('/')
        .nth(2)
        .unwrap_or(url)
        .trim_start_matches("www.");
    host.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_href_substitutes_underscores() {
        assert_eq!(page_href("Front Page"), "/Front_Page");
        assert_eq!(page_href("Home"), "/Home");
    }

    #[test]
    fn page_href_keeps_slashes_and_encodes_the_rest() {
        assert_eq!(page_href("projects/alpha"), "/projects/alpha");
        assert_eq!(page_href("C++ notes"), "/C%2B%2B_notes");
        assert_eq!(page_href("Label:news"), "/Label%3Anews");
    }

    #[test]
    fn query_values_are_form_encoded() {
        assert_eq!(edit_href("Front Page"), "/w/edit?page=Front+Page");
        assert_eq!(
            login_href("/Front_Page"),
            "/w/login?back=%2FFront_Page"
        );
    }

    #[test]
    fn hostname_strips_scheme_and_www() {
        assert_eq!(display_hostname("https://www.example.com/page"), "example.com");
        assert_eq!(display_hostname("http://wiki.example.org/a/b"), "wiki.example.org");
    }
}
