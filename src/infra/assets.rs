//! Embedded static assets.
//!
//! The `static/` directory is compiled into the binary, so a deployment
//! is a single executable plus its database and upload directory.

use axum::{
    extract::Path,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use include_dir::{Dir, include_dir};
use mime_guess::MimeGuess;

use crate::application::error::ErrorReport;

static STATIC_ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/static");

/// Serve an embedded static asset.
pub async fn serve_static(path: Option<Path<String>>) -> Response {
    let captured = path.map(|Path(value)| value);
    match resolve_asset(captured) {
        Some(asset) => asset.into_response(),
        None => not_found_response(),
    }
}

fn not_found_response() -> Response {
    let mut response = StatusCode::NOT_FOUND.into_response();
    ErrorReport::from_message(
        "infra::assets::serve_static",
        StatusCode::NOT_FOUND,
        "Static asset not found",
    )
    .attach(&mut response);
    response
}

struct Asset {
    contents: &'static [u8],
    mime: MimeGuess,
}

fn resolve_asset(path: Option<String>) -> Option<Asset> {
    let mut candidate = path.unwrap_or_default();
    if candidate.starts_with('/') {
        candidate = candidate.trim_start_matches('/').to_string();
    }

    if candidate.is_empty() || candidate.ends_with('/') || candidate.contains("..") {
        // Avoid directory traversal and disallow directory listings.
        return None;
    }

    let file = STATIC_ASSETS.get_file(&candidate)?;
    Some(Asset {
        contents: file.contents(),
        mime: mime_guess::from_path(&candidate),
    })
}

impl IntoResponse for Asset {
    fn into_response(self) -> Response {
        let content_type = self.mime.first_or_octet_stream().to_string();
        (
            [
                (header::CONTENT_TYPE, content_type),
                // Assets are not content-hashed, so keep revalidation cheap.
                (
                    header::CACHE_CONTROL,
                    String::from("public, max-age=3600"),
                ),
            ],
            Bytes::from_static(self.contents),
        )
            .into_response()
    }
}
