//! Handlers for wiki pages themselves: viewing, editing, history,
//! backlinks and the site-wide listings.

use axum::{
    Extension, Form,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, Uri},
    response::Response,
};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    application::{
        error::WikiError,
        pages::{EditOutcome, EditSubmission, normalize_title},
        settings::WikiSettings,
    },
    cache::{CacheKey, CachedContent},
    domain::types::Principal,
    presentation::views::{
        BackLinksTemplate, BackLinksView, ChangesTemplate, ChangesView, EditPageView,
        EditTemplate, HistoryTemplate, IndexTemplate, IndexView, InterwikiTemplate,
        InterwikiView, Layout, PageContentView, PageTemplate, render_template,
        render_template_response,
    },
    util::urls,
};

use super::{HttpState, respond};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct PageQuery {
    format: Option<String>,
    r: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct PageRef {
    page: Option<String>,
}

pub(super) async fn front_page(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<PageQuery>,
) -> Result<Response, WikiError> {
    let settings = state.settings.load().await?;
    let title = settings.start_page().to_string();
    page_response(&state, &settings, &principal, title, query).await
}

/// Fallback for every path no route claims: the path is the title.
pub(super) async fn any_page(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
    uri: Uri,
    Query(query): Query<PageQuery>,
) -> Result<Response, WikiError> {
    let raw = percent_decode_str(uri.path())
        .decode_utf8()
        .map_err(|_| WikiError::bad_request("The request path is not valid UTF-8."))?;
    let title = normalize_title(raw.trim_start_matches('/'));
    let settings = state.settings.load().await?;
    page_response(&state, &settings, &principal, title, query).await
}

/// One page in one of its three shapes: rendered, raw, or a frozen
/// revision. Each shape caches under its own key.
async fn page_response(
    state: &HttpState,
    settings: &WikiSettings,
    principal: &Principal,
    title: String,
    query: PageQuery,
) -> Result<Response, WikiError> {
    let current_path = urls::page_href(&title);

    let content = if query.format.as_deref() == Some("raw") {
        state
            .resolver
            .resolve(CacheKey::RawPage(title.clone()), principal, async {
                let raw = state.pages.raw_page(settings, principal, &title).await?;
                Ok(CachedContent::new(raw.content_type, raw.body))
            })
            .await?
    } else if let Some(revision) = query.r {
        state
            .resolver
            .resolve(
                CacheKey::PageRevision(revision.to_string()),
                principal,
                async {
                    let view = state
                        .pages
                        .view_revision(settings, principal, &title, revision)
                        .await?;
                    page_content(state, settings, principal, &current_path, view).await
                },
            )
            .await?
    } else {
        state
            .resolver
            .resolve(CacheKey::Page(title.clone()), principal, async {
                let view = state.pages.view_page(settings, principal, &title).await?;
                page_content(state, settings, principal, &current_path, view).await
            })
            .await?
    };

    Ok(respond::content_response(&content))
}

async fn page_content(
    state: &HttpState,
    settings: &WikiSettings,
    principal: &Principal,
    current_path: &str,
    view: PageContentView,
) -> Result<CachedContent, WikiError> {
    let chrome = state
        .chrome
        .assemble(settings, principal, current_path)
        .await?;
    let html = render_template(PageTemplate {
        view: Layout::new(chrome, view),
    })?;
    Ok(CachedContent::html(html.0))
}

pub(super) async fn edit_page(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<PageRef>,
) -> Result<Response, WikiError> {
    let title = required_page(query.page)?;
    let settings = state.settings.load().await?;
    let view = state.edits.edit_form(&settings, &principal, &title).await?;
    edit_screen(&state, &settings, &principal, view).await
}

#[derive(Debug, Deserialize)]
pub(super) struct EditForm {
    name: String,
    #[serde(default)]
    body: String,
    // The preview button submits its own label.
    #[serde(default, rename = "Preview")]
    preview: Option<String>,
    #[serde(default)]
    delete: Option<String>,
}

pub(super) async fn save_page(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    Form(form): Form<EditForm>,
) -> Result<Response, WikiError> {
    let settings = state.settings.load().await?;
    let submission = EditSubmission {
        title: normalize_title(&form.name),
        body: form.body,
        preview: form.preview.is_some(),
        delete: form.delete.as_deref() == Some("yes"),
    };
    match state.edits.submit(&settings, &principal, submission).await? {
        EditOutcome::Saved { location } => Ok(respond::redirect_response(
            respond::is_xhr(&headers),
            &location,
        )),
        EditOutcome::Preview(view) => edit_screen(&state, &settings, &principal, view).await,
    }
}

async fn edit_screen(
    state: &HttpState,
    settings: &WikiSettings,
    principal: &Principal,
    view: EditPageView,
) -> Result<Response, WikiError> {
    let current_path = urls::edit_href(&view.title);
    let chrome = state
        .chrome
        .assemble(settings, principal, &current_path)
        .await?;
    Ok(render_template_response(
        EditTemplate {
            view: Layout::new(chrome, view),
        },
        StatusCode::OK,
    ))
}

pub(super) async fn page_history(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<PageRef>,
) -> Result<Response, WikiError> {
    let title = required_page(query.page)?;
    let settings = state.settings.load().await?;
    let content = state
        .resolver
        .resolve(CacheKey::PageHistory(title.clone()), &principal, async {
            let view = state.pages.history(&settings, &principal, &title).await?;
            let chrome = state
                .chrome
                .assemble(&settings, &principal, "/w/history")
                .await?;
            let html = render_template(HistoryTemplate {
                view: Layout::new(chrome, view),
            })?;
            Ok(CachedContent::html(html.0))
        })
        .await?;
    Ok(respond::content_response(&content))
}

pub(super) async fn page_backlinks(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<PageRef>,
) -> Result<Response, WikiError> {
    let title = required_page(query.page)?;
    let settings = state.settings.load().await?;
    let content = state
        .resolver
        .resolve(CacheKey::BackLinks(title.clone()), &principal, async {
            let sources = state.pages.backlinks(&settings, &principal, &title).await?;
            let view = BackLinksView {
                page_url: urls::page_href(&title),
                title: title.clone(),
                sources,
            };
            let chrome = state
                .chrome
                .assemble(&settings, &principal, "/w/backlinks")
                .await?;
            let html = render_template(BackLinksTemplate {
                view: Layout::new(chrome, view),
            })?;
            Ok(CachedContent::html(html.0))
        })
        .await?;
    Ok(respond::content_response(&content))
}

pub(super) async fn page_index(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, WikiError> {
    let settings = state.settings.load().await?;
    let content = state
        .resolver
        .resolve(CacheKey::Index, &principal, async {
            let pages = state.site.page_index(&settings, &principal).await?;
            let chrome = state
                .chrome
                .assemble(&settings, &principal, "/w/index")
                .await?;
            let html = render_template(IndexTemplate {
                view: Layout::new(chrome, IndexView { pages }),
            })?;
            Ok(CachedContent::html(html.0))
        })
        .await?;
    Ok(respond::content_response(&content))
}

pub(super) async fn recent_changes(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, WikiError> {
    let settings = state.settings.load().await?;
    let content = state
        .resolver
        .resolve(CacheKey::Changes, &principal, async {
            let entries = state.site.changes(&settings, &principal).await?;
            let chrome = state
                .chrome
                .assemble(&settings, &principal, "/w/changes")
                .await?;
            let html = render_template(ChangesTemplate {
                view: Layout::new(chrome, ChangesView { entries }),
            })?;
            Ok(CachedContent::html(html.0))
        })
        .await?;
    Ok(respond::content_response(&content))
}

pub(super) async fn interwiki_map(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, WikiError> {
    let settings = state.settings.load().await?;
    let entries = state.site.interwiki(&settings);
    let chrome = state
        .chrome
        .assemble(&settings, &principal, "/w/interwiki")
        .await?;
    Ok(render_template_response(
        InterwikiTemplate {
            view: Layout::new(chrome, InterwikiView { entries }),
        },
        StatusCode::OK,
    ))
}

fn required_page(page: Option<String>) -> Result<String, WikiError> {
    let title = page.unwrap_or_default();
    if title.trim().is_empty() {
        return Err(WikiError::bad_request("Page name not specified."));
    }
    Ok(normalize_title(&title))
}
