//! Image endpoints: upload, the detail and list screens, and the
//! stored bytes themselves.

use axum::{
    Extension,
    body::Body,
    extract::{Query, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::Response,
};
use axum_extra::extract::{Multipart, multipart::MultipartError};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    application::{error::WikiError, images::ImageFile},
    domain::types::Principal,
    presentation::views::{
        ImageDetailTemplate, ImageListTemplate, ImageUploadTemplate, Layout,
        render_template_response,
    },
};

use super::{HttpState, respond};

pub(super) async fn upload_form(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, WikiError> {
    let settings = state.settings.load().await?;
    state.images.check_can_upload(&settings, &principal)?;
    let chrome = state
        .chrome
        .assemble(&settings, &principal, "/w/image/upload")
        .await?;
    Ok(render_template_response(
        ImageUploadTemplate {
            view: Layout::new(chrome, ()),
        },
        StatusCode::OK,
    ))
}

pub(super) async fn upload_image(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, WikiError> {
    let settings = state.settings.load().await?;
    state.images.check_can_upload(&settings, &principal)?;

    let mut uploaded: Option<Uuid> = None;
    while let Some(field) = multipart.next_field().await.map_err(malformed_upload)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or("upload.bin")
            .to_string();
        let declared_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(malformed_upload)?;

        let id = state
            .images
            .upload(&settings, &principal, &file_name, declared_type.as_deref(), data)
            .await?;
        uploaded = Some(id);
        break;
    }

    let id = uploaded.ok_or_else(|| WikiError::bad_request("No file supplied."))?;
    Ok(respond::redirect_response(
        respond::is_xhr(&headers),
        &format!("/w/image/view?key={id}"),
    ))
}

#[derive(Debug, Deserialize)]
pub(super) struct ImageKey {
    key: Uuid,
}

pub(super) async fn image_detail(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ImageKey>,
) -> Result<Response, WikiError> {
    let settings = state.settings.load().await?;
    let view = state.images.detail(&settings, &principal, query.key).await?;
    let chrome = state
        .chrome
        .assemble(&settings, &principal, "/w/image/view")
        .await?;
    Ok(render_template_response(
        ImageDetailTemplate {
            view: Layout::new(chrome, view),
        },
        StatusCode::OK,
    ))
}

pub(super) async fn image_list(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, WikiError> {
    let settings = state.settings.load().await?;
    let view = state.images.list(&settings, &principal).await?;
    let chrome = state
        .chrome
        .assemble(&settings, &principal, "/w/image/list")
        .await?;
    Ok(render_template_response(
        ImageListTemplate {
            view: Layout::new(chrome, view),
        },
        StatusCode::OK,
    ))
}

/// The stored bytes. Image URLs never change once uploaded, so clients
/// may cache aggressively.
pub(super) async fn image_file(
    State(state): State<HttpState>,
    Query(query): Query<ImageKey>,
) -> Result<Response, WikiError> {
    let file = state.images.serve_file(query.key).await?;
    Ok(build_file_response(file))
}

fn build_file_response(file: ImageFile) -> Response {
    let length = file.data.len();
    let mut response = Response::new(Body::from(file.data));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&file.content_type) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}

fn malformed_upload(err: MultipartError) -> WikiError {
    WikiError::bad_request(format!("Malformed upload: {err}"))
}
