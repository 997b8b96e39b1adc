//! View models and askama templates.
//!
//! Services build these structs with every string precomputed (dates
//! localized, URLs encoded, markdown rendered), so templates only place
//! values. Each page template wraps its content in [`Layout`] to pick up
//! the shared chrome.

use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

use crate::application::error::WikiError;

#[derive(Debug, Error)]
#[error("template rendering failed")]
pub struct TemplateRenderError {
    #[source]
    pub(crate) error: AskamaError,
}

impl From<TemplateRenderError> for WikiError {
    fn from(err: TemplateRenderError) -> Self {
        WikiError::internal_from("template rendering failed", err.error)
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, WikiError> {
    template
        .render()
        .map(Html)
        .map_err(|error| TemplateRenderError { error }.into())
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Signed-in user shown in the chrome.
#[derive(Clone)]
pub struct UserView {
    pub nickname: String,
    pub email: String,
}

/// Chrome shared by every rendered page.
#[derive(Clone)]
pub struct SiteChrome {
    pub site_title: String,
    pub user: Option<UserView>,
    pub signed_in: bool,
    /// Login URL for visitors, logout URL for signed-in users; either way
    /// it returns to the page it was clicked on.
    pub auth_url: String,
    pub is_admin: bool,
    pub sidebar_html: String,
    pub footer_html: String,
    pub base_url: String,
    pub map_enabled: bool,
}

pub struct Layout<T> {
    pub chrome: SiteChrome,
    pub content: T,
}

impl<T> Layout<T> {
    pub fn new(chrome: SiteChrome, content: T) -> Self {
        Self { chrome, content }
    }
}

#[derive(Clone)]
pub struct PageLink {
    pub href: String,
    pub title: String,
}

#[derive(Clone)]
pub struct Crumb {
    pub href: String,
    pub text: String,
}

/// A fully prepared page view.
pub struct PageContentView {
    pub title: String,
    pub display_name: String,
    pub html: String,
    pub labels: Vec<PageLink>,
    pub breadcrumbs: Vec<Crumb>,
    pub can_edit: bool,
    pub edit_url: String,
    pub history_url: String,
    pub backlinks_url: String,
    pub updated_display: String,
    pub author: String,
    pub map_url: Option<String>,
    /// Set when viewing an old revision rather than the current page.
    pub revision_note: Option<String>,
}

#[derive(Template)]
#[template(path = "page.html")]
pub struct PageTemplate {
    pub view: Layout<PageContentView>,
}

pub struct ErrorContentView {
    pub title: String,
    pub html: String,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: Layout<ErrorContentView>,
}

pub struct EditPageView {
    pub title: String,
    pub body: String,
    pub preview_html: Option<String>,
    pub can_delete: bool,
}

#[derive(Template)]
#[template(path = "edit.html")]
pub struct EditTemplate {
    pub view: Layout<EditPageView>,
}

#[derive(Clone)]
pub struct RevisionEntry {
    pub url: String,
    pub created_display: String,
    pub author: String,
}

pub struct HistoryView {
    pub title: String,
    pub page_url: String,
    pub entries: Vec<RevisionEntry>,
}

#[derive(Template)]
#[template(path = "history.html")]
pub struct HistoryTemplate {
    pub view: Layout<HistoryView>,
}

pub struct BackLinksView {
    pub title: String,
    pub page_url: String,
    pub sources: Vec<PageLink>,
}

#[derive(Template)]
#[template(path = "backlinks.html")]
pub struct BackLinksTemplate {
    pub view: Layout<BackLinksView>,
}

pub struct IndexView {
    pub pages: Vec<PageLink>,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: Layout<IndexView>,
}

#[derive(Clone)]
pub struct ChangeEntry {
    pub href: String,
    pub title: String,
    pub updated_display: String,
    pub author: String,
}

pub struct ChangesView {
    pub entries: Vec<ChangeEntry>,
}

#[derive(Template)]
#[template(path = "changes.html")]
pub struct ChangesTemplate {
    pub view: Layout<ChangesView>,
}

#[derive(Clone)]
pub struct UserRow {
    pub id: String,
    pub nickname: String,
    pub email: String,
    pub joined_display: String,
    pub editor_access: bool,
    pub staff_access: bool,
}

pub struct UsersView {
    pub users: Vec<UserRow>,
    pub can_manage: bool,
}

#[derive(Template)]
#[template(path = "users.html")]
pub struct UsersTemplate {
    pub view: Layout<UsersView>,
}

pub struct ProfileView {
    pub nickname: String,
    pub public_email: String,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: Layout<ProfileView>,
}

pub struct LoginView {
    pub back: String,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub view: Layout<LoginView>,
}

#[derive(Template)]
#[template(path = "import.html")]
pub struct ImportTemplate {
    pub view: Layout<()>,
}

#[derive(Template)]
#[template(path = "image_upload.html")]
pub struct ImageUploadTemplate {
    pub view: Layout<()>,
}

pub struct ImageDetailView {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub size_display: String,
    pub file_url: String,
    pub embed_snippet: String,
    pub uploaded_display: String,
    pub uploaded_by: String,
    pub backlinks: Vec<PageLink>,
}

#[derive(Template)]
#[template(path = "image_view.html")]
pub struct ImageDetailTemplate {
    pub view: Layout<ImageDetailView>,
}

#[derive(Clone)]
pub struct ImageCard {
    pub view_url: String,
    pub file_url: String,
    pub file_name: String,
}

pub struct ImageListView {
    pub images: Vec<ImageCard>,
    pub can_upload: bool,
}

#[derive(Template)]
#[template(path = "image_list.html")]
pub struct ImageListTemplate {
    pub view: Layout<ImageListView>,
}

/// Map of a single page's location.
pub struct SinglePageMapView {
    pub title: String,
    pub page_url: String,
    pub lat: String,
    pub lng: String,
}

#[derive(Template)]
#[template(path = "map.html")]
pub struct SinglePageMapTemplate {
    pub view: Layout<SinglePageMapView>,
}

/// Map of all located pages under one label.
pub struct PagesMapView {
    pub label: String,
    pub data_url: String,
}

#[derive(Template)]
#[template(path = "page_map.html")]
pub struct PagesMapTemplate {
    pub view: Layout<PagesMapView>,
}

/// Fragment rendered into each map marker's popup.
pub struct MapInfoWindowView {
    pub title: String,
    pub href: String,
    pub summary: String,
}

#[derive(Template)]
#[template(path = "map_info_window.html")]
pub struct MapInfoWindowTemplate {
    pub view: MapInfoWindowView,
}

pub struct InterwikiView {
    pub entries: Vec<InterwikiEntry>,
}

#[derive(Clone)]
pub struct InterwikiEntry {
    pub name: String,
    pub pattern: String,
}

#[derive(Template)]
#[template(path = "interwiki.html")]
pub struct InterwikiTemplate {
    pub view: Layout<InterwikiView>,
}
