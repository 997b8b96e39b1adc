//! Page viewing and editing.
//!
//! The read side resolves titles to fully prepared view models; the write
//! side applies edits, keeps the revision trail, and purges the cache keys
//! the edit made stale.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::application::access::AccessPolicy;
use crate::application::error::WikiError;
use crate::application::render::ContentRenderer;
use crate::application::repos::{PageStore, RepoError, SavePageParams};
use crate::application::settings::WikiSettings;
use crate::cache::InvalidationEngine;
use crate::domain::entities::PageRecord;
use crate::domain::source::{self, PageSource};
use crate::domain::types::Principal;
use crate::presentation::views::{
    Crumb, EditPageView, HistoryView, PageContentView, PageLink, RevisionEntry,
};
use crate::util::{timezone, urls};

/// Redirect chains longer than this stop at the last reachable page.
const MAX_REDIRECT_HOPS: usize = 8;

const HISTORY_LIMIT: u32 = 100;

/// Page body served without the template layer, for `format=raw`.
pub struct RawPageBody {
    pub content_type: String,
    pub body: String,
}

/// Turns decoded request paths into stored titles.
pub fn normalize_title(raw: &str) -> String {
    raw.replace('_', " ")
}

fn display_author(email: Option<&str>) -> String {
    match email {
        Some(email) => email.split('@').next().unwrap_or(email).to_string(),
        None => "anonymous".to_string(),
    }
}

#[derive(Clone)]
pub struct PageService {
    pages: Arc<dyn PageStore>,
    access: Arc<dyn AccessPolicy>,
    renderer: Arc<dyn ContentRenderer>,
}

impl PageService {
    pub fn new(
        pages: Arc<dyn PageStore>,
        access: Arc<dyn AccessPolicy>,
        renderer: Arc<dyn ContentRenderer>,
    ) -> Self {
        Self {
            pages,
            access,
            renderer,
        }
    }

    /// The rendered view of a page, following redirects.
    pub async fn view_page(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        title: &str,
    ) -> Result<PageContentView, WikiError> {
        let record = self.load_readable(settings, principal, title).await?;
        let record = self.resolve_redirects(record).await?;
        debug!(title = record.title, "Viewing page");

        let html = self.render_body(settings, &record.body).await?;
        Ok(self.build_view(settings, principal, &record, html, None))
    }

    /// The rendered view of one historical revision. Redirects are not
    /// followed: the revision is shown exactly as it was saved.
    pub async fn view_revision(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        title: &str,
        revision_id: Uuid,
    ) -> Result<PageContentView, WikiError> {
        let mut record = self.load_readable(settings, principal, title).await?;
        let revision = self
            .pages
            .find_revision(revision_id)
            .await?
            .filter(|revision| revision.page_title == record.title)
            .ok_or_else(|| WikiError::not_found("No such revision."))?;

        let saved = timezone::display_datetime(revision.created_at, settings.timezone());
        record.body = revision.body;
        record.author_email = revision.author_email;
        record.updated_at = revision.created_at;
        debug!(title = record.title, revision = %revision_id, "Viewing revision");

        let html = self.render_body(settings, &record.body).await?;
        let note = format!("This is an old revision of the page, saved {saved}.");
        Ok(self.build_view(settings, principal, &record, html, Some(note)))
    }

    /// The stored body with its declared content type, bypassing the
    /// template layer. Lets a wiki page double as a stylesheet or script.
    pub async fn raw_page(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        title: &str,
    ) -> Result<RawPageBody, WikiError> {
        let record = self.load_readable(settings, principal, title).await?;
        let source = PageSource::parse(&record.body);
        Ok(RawPageBody {
            content_type: source.content_type().to_string(),
            body: source.body().to_string(),
        })
    }

    pub async fn history(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        title: &str,
    ) -> Result<HistoryView, WikiError> {
        self.check_page_listing(settings, principal, title).await?;
        let tz = settings.timezone();
        let entries = self
            .pages
            .history(title, HISTORY_LIMIT)
            .await?
            .into_iter()
            .map(|revision| RevisionEntry {
                url: format!("{}?r={}", urls::page_href(title), revision.id),
                created_display: timezone::display_datetime(revision.created_at, tz),
                author: display_author(revision.author_email.as_deref()),
            })
            .collect();
        Ok(HistoryView {
            title: title.to_string(),
            page_url: urls::page_href(title),
            entries,
        })
    }

    pub async fn backlinks(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        title: &str,
    ) -> Result<Vec<PageLink>, WikiError> {
        self.check_page_listing(settings, principal, title).await?;
        let sources = self
            .pages
            .backlinks_for(title)
            .await?
            .into_iter()
            .map(|title| PageLink {
                href: urls::page_href(&title),
                title,
            })
            .collect();
        Ok(sources)
    }

    /// Loads a page the principal may read. Missing `Label:` pages get a
    /// generated body listing their members; other missing pages are not
    /// found. On a closed wiki the existence of a page is not revealed, so
    /// the access failure wins over the missing-page failure.
    async fn load_readable(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        title: &str,
    ) -> Result<PageRecord, WikiError> {
        if title.starts_with("w/") {
            return Err(WikiError::not_found("No such page."));
        }
        match self.pages.find_by_title(title).await? {
            Some(record) => {
                if !self.access.can_read_page(settings, principal, &record) {
                    return Err(WikiError::forbidden("You may not read this page."));
                }
                Ok(record)
            }
            None => {
                if !self.access.can_list_pages(settings, principal) {
                    return Err(WikiError::forbidden("You may not read this page."));
                }
                if let Some(label) = title.strip_prefix("Label:") {
                    return Ok(synthetic_label_page(title, label));
                }
                Err(WikiError::not_found("No such page."))
            }
        }
    }

    async fn check_page_listing(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        title: &str,
    ) -> Result<(), WikiError> {
        // History and backlinks survive page deletion, so the gate falls
        // back to the listing permission when the page itself is gone.
        match self.pages.find_by_title(title).await? {
            Some(record) if !self.access.can_read_page(settings, principal, &record) => {
                Err(WikiError::forbidden("You may not read this page."))
            }
            None if !self.access.can_list_pages(settings, principal) => {
                Err(WikiError::forbidden("You may not read this page."))
            }
            _ => Ok(()),
        }
    }

    async fn resolve_redirects(&self, mut record: PageRecord) -> Result<PageRecord, WikiError> {
        let mut visited = vec![record.title.clone()];
        for _ in 0..MAX_REDIRECT_HOPS {
            let Some(target) = record.redirect.clone() else {
                break;
            };
            if visited.contains(&target) {
                debug!(title = record.title, "Redirect loop, stopping here");
                break;
            }
            match self.pages.find_by_title(&target).await? {
                Some(next) => {
                    visited.push(next.title.clone());
                    record = next;
                }
                // Dangling redirect: show the redirect page itself.
                None => break,
            }
        }
        Ok(record)
    }

    /// Renders a page body to HTML, expanding `[[List:<label>]]` blocks
    /// into listings of the labelled pages first.
    async fn render_body(
        &self,
        settings: &WikiSettings,
        body: &str,
    ) -> Result<String, RepoError> {
        let source = PageSource::parse(body);
        if source.is_plain() {
            return Ok(self.renderer.render_plain(source.body()));
        }
        let expanded = self.expand_listings(source.body()).await?;
        Ok(self.renderer.render(&expanded, &settings.interwiki()).html)
    }

    async fn expand_listings(&self, body: &str) -> Result<String, RepoError> {
        const OPEN: &str = "[[List:";
        const CLOSE: &str = "]]";
        if !body.contains(OPEN) {
            return Ok(body.to_string());
        }
        let mut out = String::with_capacity(body.len());
        let mut rest = body;
        while let Some(start) = rest.find(OPEN) {
            out.push_str(&rest[..start]);
            let after = &rest[start + OPEN.len()..];
            let Some(end) = after.find(CLOSE) else {
                // Unterminated directive, keep it verbatim.
                out.push_str(&rest[start..]);
                rest = "";
                break;
            };
            let label = &after[..end];
            let members = self.pages.by_label(label).await?;
            if members.is_empty() {
                out.push_str("_No pages with this label yet._");
            } else {
                for member in &members {
                    out.push_str(&format!(
                        "- [{}]({})\n",
                        member.title,
                        urls::page_href(&member.title)
                    ));
                }
            }
            rest = &after[end + CLOSE.len()..];
        }
        out.push_str(rest);
        Ok(out)
    }

    fn build_view(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        record: &PageRecord,
        html: String,
        revision_note: Option<String>,
    ) -> PageContentView {
        let source = PageSource::parse(&record.body);
        let can_edit = self
            .access
            .can_edit_page(settings, principal, &record.title);

        let map_url = if settings.map_enabled() {
            if let Some(label) = source.map_label() {
                Some(format!(
                    "/w/pages/map?label={}",
                    urls::encode_query_value(label)
                ))
            } else if can_edit || record.geo.is_some() {
                Some(format!(
                    "/w/map?page={}",
                    urls::encode_query_value(&record.title)
                ))
            } else {
                None
            }
        } else {
            None
        };

        PageContentView {
            title: record.title.clone(),
            display_name: source
                .name()
                .unwrap_or(record.title.as_str())
                .to_string(),
            html,
            labels: record
                .labels
                .iter()
                .map(|label| PageLink {
                    href: urls::label_href(label),
                    title: label.clone(),
                })
                .collect(),
            breadcrumbs: breadcrumbs(&record.title),
            can_edit,
            edit_url: urls::edit_href(&record.title),
            history_url: format!(
                "/w/history?page={}",
                urls::encode_query_value(&record.title)
            ),
            backlinks_url: format!(
                "/w/backlinks?page={}",
                urls::encode_query_value(&record.title)
            ),
            updated_display: timezone::display_datetime(record.updated_at, settings.timezone()),
            author: display_author(record.author_email.as_deref()),
            map_url,
            revision_note,
        }
    }
}

/// What happens to an edit-form submission.
pub enum EditOutcome {
    /// The edit was applied; the client should go to this location.
    Saved { location: String },
    /// Preview requested: show the form again with rendered output.
    Preview(EditPageView),
}

/// A submitted edit form.
pub struct EditSubmission {
    pub title: String,
    pub body: String,
    pub preview: bool,
    pub delete: bool,
}

#[derive(Clone)]
pub struct PageEditService {
    pages: Arc<dyn PageStore>,
    access: Arc<dyn AccessPolicy>,
    renderer: Arc<dyn ContentRenderer>,
    invalidation: Arc<InvalidationEngine>,
}

impl PageEditService {
    pub fn new(
        pages: Arc<dyn PageStore>,
        access: Arc<dyn AccessPolicy>,
        renderer: Arc<dyn ContentRenderer>,
        invalidation: Arc<InvalidationEngine>,
    ) -> Self {
        Self {
            pages,
            access,
            renderer,
            invalidation,
        }
    }

    /// The edit form for a page, prefilled for pages that do not exist yet.
    pub async fn edit_form(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        title: &str,
    ) -> Result<EditPageView, WikiError> {
        self.check_can_edit(settings, principal, title)?;
        let record = self.pages.find_by_title(title).await?;
        let body = match &record {
            Some(record) => record.body.clone(),
            None => match title.strip_prefix("Label:") {
                Some(label) => source::label_page_body(title, label),
                None => source::new_page_body(title),
            },
        };
        Ok(EditPageView {
            title: title.to_string(),
            body,
            preview_html: None,
            can_delete: record.is_some(),
        })
    }

    /// Applies a submitted edit: preview, save, or delete.
    pub async fn submit(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        submission: EditSubmission,
    ) -> Result<EditOutcome, WikiError> {
        let title = submission.title.trim();
        if title.is_empty() {
            return Err(WikiError::bad_request("Page name is missing."));
        }
        self.check_can_edit(settings, principal, title)?;

        if submission.preview {
            let source = PageSource::parse(&submission.body);
            let html = self.renderer.render(source.body(), &settings.interwiki()).html;
            return Ok(EditOutcome::Preview(EditPageView {
                title: title.to_string(),
                body: submission.body,
                preview_html: Some(html),
                can_delete: self.pages.find_by_title(title).await?.is_some(),
            }));
        }

        let previous = self.pages.find_by_title(title).await?;
        let old_labels: Vec<String> = previous
            .as_ref()
            .map(|record| record.labels.clone())
            .unwrap_or_default();

        if submission.delete {
            let deleted = self.pages.delete_page(title).await?;
            if deleted {
                info!(title, "Page deleted");
                self.invalidation.purge_page(title, &old_labels);
            }
            return Ok(EditOutcome::Saved {
                location: "/".to_string(),
            });
        }

        let source = PageSource::parse(&submission.body);
        let rendered = self
            .renderer
            .render(source.body(), &settings.interwiki());
        let record = self
            .pages
            .save_page(SavePageParams {
                title: title.to_string(),
                body: submission.body.clone(),
                author_email: principal.email().map(str::to_string),
                links: rendered.links,
                updated_at: None,
            })
            .await?;
        info!(title = record.title, "Page saved");

        let labels = label_union(old_labels, record.labels.clone());
        self.invalidation.purge_page(&record.title, &labels);

        Ok(EditOutcome::Saved {
            location: urls::page_href(&record.title),
        })
    }

    fn check_can_edit(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        title: &str,
    ) -> Result<(), WikiError> {
        if self.access.can_edit_page(settings, principal, title) {
            Ok(())
        } else {
            Err(WikiError::forbidden("You may not edit this page."))
        }
    }
}

fn synthetic_label_page(title: &str, label: &str) -> PageRecord {
    PageRecord {
        id: Uuid::nil(),
        title: title.to_string(),
        body: source::label_page_body(title, label),
        author_email: None,
        labels: Vec::new(),
        redirect: None,
        geo: None,
        is_public: None,
        created_at: time::OffsetDateTime::now_utc(),
        updated_at: time::OffsetDateTime::now_utc(),
    }
}

fn breadcrumbs(title: &str) -> Vec<Crumb> {
    let segments: Vec<&str> = title.split('/').collect();
    if segments.len() < 2 {
        return Vec::new();
    }
    let mut crumbs = Vec::with_capacity(segments.len() - 1);
    let mut path = String::new();
    for segment in &segments[..segments.len() - 1] {
        if !path.is_empty() {
            path.push('/');
        }
        path.push_str(segment);
        crumbs.push(Crumb {
            href: urls::page_href(&path),
            text: segment.to_string(),
        });
    }
    crumbs
}

pub(crate) fn label_union(old: Vec<String>, new: Vec<String>) -> Vec<String> {
    let mut union = old;
    for label in new {
        if !union.contains(&label) {
            union.push(label);
        }
    }
    union
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_use_spaces_internally() {
        assert_eq!(normalize_title("Front_Page"), "Front Page");
        assert_eq!(normalize_title("Plain"), "Plain");
    }

    #[test]
    fn breadcrumbs_walk_the_title_path() {
        let crumbs = breadcrumbs("Travel/Finland/Helsinki");
        assert_eq!(crumbs.len(), 2);
        assert_eq!(crumbs[0].text, "Travel");
        assert_eq!(crumbs[0].href, "/Travel");
        assert_eq!(crumbs[1].text, "Finland");
        assert_eq!(crumbs[1].href, "/Travel/Finland");
    }

    #[test]
    fn flat_titles_have_no_breadcrumbs() {
        assert!(breadcrumbs("Home").is_empty());
    }

    #[test]
    fn label_union_keeps_labels_from_both_versions() {
        let union = label_union(
            vec!["old".to_string(), "both".to_string()],
            vec!["both".to_string(), "new".to_string()],
        );
        assert_eq!(union, vec!["old", "both", "new"]);
    }

    #[test]
    fn authors_display_without_the_domain() {
        assert_eq!(display_author(Some("alice@example.com")), "alice");
        assert_eq!(display_author(None), "anonymous");
    }
}
