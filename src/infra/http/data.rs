//! Data movement endpoints: JSON archive export/import and the cache
//! purge hooks.

use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::Response,
};
use axum_extra::extract::{Multipart, multipart::MultipartError};

use crate::{
    application::{
        archive::ARCHIVE_FILE_NAME,
        error::WikiError,
        jobs::enqueue_purge_all,
    },
    domain::types::Principal,
    presentation::views::{ImportTemplate, Layout, render_template_response},
};

use super::{HttpState, respond};

pub(super) async fn export_archive(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, WikiError> {
    let body = state.archive.export(&principal).await?;
    Ok(respond::attachment_response(
        ARCHIVE_FILE_NAME,
        "application/json",
        body,
    ))
}

pub(super) async fn import_form(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, WikiError> {
    if !state.access.is_admin(&principal) {
        return Err(WikiError::forbidden("Only admins may move data around."));
    }
    let settings = state.settings.load().await?;
    let chrome = state
        .chrome
        .assemble(&settings, &principal, "/w/data/import")
        .await?;
    Ok(render_template_response(
        ImportTemplate {
            view: Layout::new(chrome, ()),
        },
        StatusCode::OK,
    ))
}

pub(super) async fn import_archive(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
    mut multipart: Multipart,
) -> Result<Response, WikiError> {
    let settings = state.settings.load().await?;

    let mut archive_json: Option<String> = None;
    let mut merge = false;
    while let Some(field) = multipart.next_field().await.map_err(malformed_upload)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => archive_json = Some(field.text().await.map_err(malformed_upload)?),
            Some("merge") => merge = field.text().await.map_err(malformed_upload)? == "yes",
            _ => {}
        }
    }
    let archive_json =
        archive_json.ok_or_else(|| WikiError::bad_request("No archive file supplied."))?;

    let report = state
        .archive
        .import(&settings, &principal, &archive_json, merge)
        .await?;
    Ok(respond::plain_response(
        StatusCode::OK,
        format!(
            "Done. Saved {} pages, deleted {}.\n",
            report.saved, report.deleted
        ),
    ))
}

/// Queues a deferred purge on the job queue. The worker does the work,
/// so the request returns before the cache is actually cold.
pub(super) async fn queue_cache_purge(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, WikiError> {
    require_purge_access(&state, &principal)?;
    enqueue_purge_all(state.jobs.as_ref(), Some("admin request".to_string())).await?;
    Ok(respond::plain_response(
        StatusCode::OK,
        "Cache purge queued.\n",
    ))
}

pub(super) async fn run_cache_purge(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, WikiError> {
    require_purge_access(&state, &principal)?;
    state.invalidation.purge_all().await?;
    Ok(respond::plain_response(StatusCode::OK, "Cache purged.\n"))
}

fn require_purge_access(state: &HttpState, principal: &Principal) -> Result<(), WikiError> {
    if state.access.is_admin(principal) {
        Ok(())
    } else {
        Err(WikiError::forbidden("Only admins may purge the cache."))
    }
}

fn malformed_upload(err: MultipartError) -> WikiError {
    WikiError::bad_request(format!("Malformed upload: {err}"))
}
