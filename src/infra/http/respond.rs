//! Response envelopes shared by the handlers.
//!
//! Browsers get HTML screens and real redirects; script clients that set
//! `X-Requested-With: XMLHttpRequest` get small JSON envelopes instead,
//! so a form post never strands them on a redirect they cannot follow.

use axum::{
    Json,
    http::{
        HeaderMap, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;

use crate::application::error::ErrorDescriptor;
use crate::cache::CachedContent;

const XHR_HEADER: &str = "x-requested-with";

pub fn is_xhr(headers: &HeaderMap) -> bool {
    headers
        .get(XHR_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("xmlhttprequest"))
}

/// Text responses always declare their charset; old feed readers and
/// scripts guess badly when it is left out.
pub fn with_charset(content_type: &str) -> String {
    if content_type.contains("charset") {
        content_type.to_string()
    } else {
        format!("{content_type}; charset=utf-8")
    }
}

pub fn content_response(content: &CachedContent) -> Response {
    (
        [(CONTENT_TYPE, with_charset(&content.content_type))],
        content.body.clone(),
    )
        .into_response()
}

/// A `303 See Other` for browsers, `{"status":"redirect"}` for scripts.
pub fn redirect_response(xhr: bool, location: &str) -> Response {
    if xhr {
        Json(json!({ "status": "redirect", "url": location })).into_response()
    } else {
        Redirect::to(location).into_response()
    }
}

pub fn error_envelope(descriptor: &ErrorDescriptor) -> Response {
    (
        descriptor.kind.status(),
        Json(json!({
            "status": "error",
            "error": descriptor.message,
            "error_class": descriptor.kind.class_name(),
        })),
    )
        .into_response()
}

pub fn plain_response(status: StatusCode, body: impl Into<String>) -> Response {
    (
        status,
        [(CONTENT_TYPE, String::from("text/plain; charset=utf-8"))],
        body.into(),
    )
        .into_response()
}

pub fn script_response(body: String) -> Response {
    (
        [(CONTENT_TYPE, String::from("text/javascript; charset=utf-8"))],
        body,
    )
        .into_response()
}

pub fn attachment_response(file_name: &str, content_type: &str, body: String) -> Response {
    (
        [
            (CONTENT_TYPE, with_charset(content_type)),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    )
        .into_response()
}
