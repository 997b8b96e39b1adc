//! Map screens and the marker data script they load.

use axum::{
    Extension,
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;

use crate::{
    application::error::WikiError,
    domain::types::Principal,
    presentation::views::{
        Layout, PagesMapTemplate, SinglePageMapTemplate, render_template_response,
    },
};

use super::{HttpState, respond};

#[derive(Debug, Deserialize)]
pub(super) struct MapPageQuery {
    page: String,
}

pub(super) async fn page_map(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<MapPageQuery>,
) -> Result<Response, WikiError> {
    let settings = state.settings.load().await?;
    let view = state
        .site
        .single_page_map(&settings, &principal, &query.page)
        .await?;
    let chrome = state.chrome.assemble(&settings, &principal, "/w/map").await?;
    Ok(render_template_response(
        SinglePageMapTemplate {
            view: Layout::new(chrome, view),
        },
        StatusCode::OK,
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct MapLabelQuery {
    label: Option<String>,
}

pub(super) async fn label_map(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<MapLabelQuery>,
) -> Result<Response, WikiError> {
    let settings = state.settings.load().await?;
    let view = state.site.label_map(query.label.as_deref().unwrap_or_default());
    let chrome = state
        .chrome
        .assemble(&settings, &principal, "/w/pages/map")
        .await?;
    Ok(render_template_response(
        PagesMapTemplate {
            view: Layout::new(chrome, view),
        },
        StatusCode::OK,
    ))
}

pub(super) async fn map_data(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<MapLabelQuery>,
) -> Result<Response, WikiError> {
    let settings = state.settings.load().await?;
    let script = state
        .site
        .map_data(&settings, &principal, query.label.as_deref())
        .await?;
    Ok(respond::script_response(script))
}
