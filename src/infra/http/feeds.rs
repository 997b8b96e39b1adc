//! Feed and crawler endpoints: Atom/RSS feeds, the sitemap and robots.txt.

use axum::{
    Extension,
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;

use crate::{
    application::error::WikiError,
    cache::{CacheKey, CachedContent},
    domain::types::Principal,
};

use super::{HttpState, respond};

const ATOM_TYPE: &str = "application/atom+xml";
const RSS_TYPE: &str = "text/xml";

pub(super) async fn index_feed(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, WikiError> {
    let settings = state.settings.load().await?;
    let content = state
        .resolver
        .resolve(CacheKey::IndexFeed, &principal, async {
            let xml = state.feeds.index_feed(&settings, &principal).await?;
            Ok(CachedContent::new(ATOM_TYPE, xml))
        })
        .await?;
    Ok(respond::content_response(&content))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct LabelQuery {
    label: Option<String>,
}

pub(super) async fn label_feed(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<LabelQuery>,
) -> Result<Response, WikiError> {
    let label = query
        .label
        .filter(|label| !label.trim().is_empty())
        .ok_or_else(|| WikiError::bad_request("Label not specified."))?;
    let settings = state.settings.load().await?;
    let content = state
        .resolver
        .resolve(CacheKey::PagesFeed(label.clone()), &principal, async {
            let xml = state.feeds.label_feed(&settings, &principal, &label).await?;
            Ok(CachedContent::new(ATOM_TYPE, xml))
        })
        .await?;
    Ok(respond::content_response(&content))
}

pub(super) async fn changes_feed(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, WikiError> {
    let settings = state.settings.load().await?;
    let content = state
        .resolver
        .resolve(CacheKey::ChangesFeed, &principal, async {
            let xml = state.feeds.changes_feed(&settings, &principal).await?;
            Ok(CachedContent::new(RSS_TYPE, xml))
        })
        .await?;
    Ok(respond::content_response(&content))
}

pub(super) async fn sitemap(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, WikiError> {
    let content = state
        .resolver
        .resolve(CacheKey::Sitemap, &principal, async {
            let xml = state.sitemap.sitemap_xml().await?;
            Ok(CachedContent::new("text/xml", xml))
        })
        .await?;
    Ok(respond::content_response(&content))
}

pub(super) async fn robots_txt(State(state): State<HttpState>) -> Response {
    respond::plain_response(StatusCode::OK, state.sitemap.robots_txt())
}
