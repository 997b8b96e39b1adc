//! Markdown rendering with wiki links.
//!
//! Page bodies are CommonMark with `[[...]]` wiki links. An AST pass
//! rewrites each link before HTML generation: interwiki schemes expand to
//! their configured external URL, `Image:` targets become inline images,
//! and everything else links to the named page. Raw HTML is allowed in
//! bodies and sanitized after rendering.

use std::collections::BTreeMap;

use ammonia::Builder as AmmoniaBuilder;
use comrak::nodes::{AstNode, NodeLink, NodeValue};
use comrak::options::Options;
use comrak::{Arena, format_html, parse_document};
use tracing::warn;

use crate::util::urls;

/// Sanitized HTML plus the wiki link targets found in the body, in
/// document order. Targets feed the backlink index on save.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedContent {
    pub html: String,
    pub links: Vec<String>,
}

/// Markdown-to-HTML collaborator.
pub trait ContentRenderer: Send + Sync {
    fn render(&self, markdown: &str, interwiki: &BTreeMap<String, String>) -> RenderedContent;

    /// Escaped verbatim rendering for `format: plain` pages.
    fn render_plain(&self, text: &str) -> String;
}

pub struct ComrakContentRenderer {
    options: Options<'static>,
    sanitizer: AmmoniaBuilder<'static>,
}

impl ComrakContentRenderer {
    pub fn new() -> Self {
        Self {
            options: default_options(),
            sanitizer: AmmoniaBuilder::default(),
        }
    }
}

impl Default for ComrakContentRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentRenderer for ComrakContentRenderer {
    fn render(&self, markdown: &str, interwiki: &BTreeMap<String, String>) -> RenderedContent {
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &self.options);
        let links = rewrite_wiki_links(root, interwiki);

        let mut html = String::new();
        if let Err(err) = format_html(root, &self.options, &mut html) {
            warn!(error = %err, "Markdown rendering failed, falling back to escaped text");
            return RenderedContent {
                html: self.render_plain(markdown),
                links,
            };
        }

        RenderedContent {
            html: self.sanitizer.clean(&html).to_string(),
            links,
        }
    }

    fn render_plain(&self, text: &str) -> String {
        format!("<pre>{}</pre>", ammonia::clean_text(text))
    }
}

fn default_options() -> Options<'static> {
    let mut options = Options::default();

    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.wikilinks_title_after_pipe = true;

    let render = &mut options.render;
    render.github_pre_lang = true;
    render.r#unsafe = true;

    options
}

/// Rewrites wiki link nodes in place and returns the internal targets.
fn rewrite_wiki_links<'a>(
    root: &'a AstNode<'a>,
    interwiki: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut links = Vec::new();
    for node in root.descendants() {
        let target = {
            let data = node.data.borrow();
            match &data.value {
                NodeValue::WikiLink(link) => Some(link.url.trim().to_string()),
                _ => None,
            }
        };
        let Some(target) = target else {
            continue;
        };

        let mut data = node.data.borrow_mut();
        if let Some((scheme, rest)) = target.split_once(':') {
            if let Some(pattern) = interwiki.get(scheme) {
                data.value = NodeValue::Link(Box::new(NodeLink {
                    url: pattern.replace("%s", &urls::encode_query_value(rest)),
                    title: String::new(),
                }));
                continue;
            }
            if scheme == "Image" {
                data.value = NodeValue::Image(Box::new(NodeLink {
                    url: format!("/w/image/file?key={}", urls::encode_query_value(rest)),
                    title: String::new(),
                }));
                links.push(target);
                continue;
            }
        }

        data.value = NodeValue::Link(Box::new(NodeLink {
            url: urls::page_href(&target),
            title: String::new(),
        }));
        links.push(target);
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> ComrakContentRenderer {
        ComrakContentRenderer::new()
    }

    fn no_interwiki() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn wiki_links_point_at_page_urls() {
        let output = renderer().render("See [[Front Page]].", &no_interwiki());
        assert!(output.html.contains(r#"href="/Front_Page""#), "{}", output.html);
        assert!(output.html.contains(">Front Page<"), "{}", output.html);
        assert_eq!(output.links, vec!["Front Page".to_string()]);
    }

    #[test]
    fn piped_links_keep_display_text() {
        let output = renderer().render("[[Target Page|click here]]", &no_interwiki());
        assert!(output.html.contains(r#"href="/Target_Page""#), "{}", output.html);
        assert!(output.html.contains(">click here<"), "{}", output.html);
        assert_eq!(output.links, vec!["Target Page".to_string()]);
    }

    #[test]
    fn interwiki_schemes_expand_to_external_urls() {
        let mut interwiki = BTreeMap::new();
        interwiki.insert(
            "wp".to_string(),
            "https://en.wikipedia.org/wiki/%s".to_string(),
        );
        let output = renderer().render("[[wp:Rust language]]", &interwiki);
        assert!(
            output
                .html
                .contains("https://en.wikipedia.org/wiki/Rust+language"),
            "{}",
            output.html
        );
        // External targets are not backlink material.
        assert!(output.links.is_empty());
    }

    #[test]
    fn image_links_become_inline_images() {
        let output = renderer().render(
            "[[Image:3f1d0e8a-0000-0000-0000-000000000000]]",
            &no_interwiki(),
        );
        assert!(output.html.contains("<img"), "{}", output.html);
        assert!(
            output
                .html
                .contains("/w/image/file?key=3f1d0e8a-0000-0000-0000-000000000000"),
            "{}",
            output.html
        );
        assert_eq!(
            output.links,
            vec!["Image:3f1d0e8a-0000-0000-0000-000000000000".to_string()]
        );
    }

    #[test]
    fn raw_html_is_sanitized() {
        let output = renderer().render(
            "hello <script>alert(1)</script> <em>world</em>",
            &no_interwiki(),
        );
        assert!(!output.html.contains("<script"), "{}", output.html);
        assert!(output.html.contains("<em>world</em>"), "{}", output.html);
    }

    #[test]
    fn plain_rendering_escapes_markup() {
        let html = renderer().render_plain("a < b & c");
        assert!(html.starts_with("<pre>"));
        assert!(html.contains("&lt;"));
        assert!(html.contains("&amp;"));
    }

    #[test]
    fn bare_urls_autolink() {
        let output = renderer().render("visit https://example.com now", &no_interwiki());
        assert!(
            output.html.contains(r#"<a href="https://example.com""#)
                || output.html.contains(r#"href="https://example.com""#),
            "{}",
            output.html
        );
    }
}
