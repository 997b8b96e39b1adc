//! Request middleware: request ids, principal resolution, response
//! logging and the error-theming layer that turns bare failures into
//! wiki screens or JSON envelopes.

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, header::COOKIE},
    middleware::Next,
    response::Response,
};
use metrics::counter;
use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    application::{
        error::{ErrorDescriptor, ErrorReport},
        users::SESSION_COOKIE,
    },
    domain::{source::PageSource, types::Principal},
    presentation::views::{ErrorContentView, ErrorTemplate, Layout, render_template_response},
};

use super::{HttpState, respond};

pub(crate) const METRIC_HTTP_ERROR: &str = "quaderno_http_error_total";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Resolves the session cookie to a [`Principal`] request extension.
///
/// A broken or stale session never fails the request; the visitor just
/// browses anonymously and whatever needs access rejects them later.
pub async fn resolve_principal(
    State(state): State<HttpState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let principal = match session_cookie(request.headers()) {
        Some(token) => match state.users.authenticate(&token).await {
            Ok(Some(user)) => Principal::User(user),
            Ok(None) => Principal::Anonymous,
            Err(err) => {
                warn!(
                    target = "quaderno::http",
                    error = %err,
                    "session lookup failed, continuing anonymously"
                );
                Principal::Anonymous
            }
        },
        None => Principal::Anonymous,
    };
    request.extensions_mut().insert(principal);
    next.run(request).await
}

pub(crate) fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(COOKIE)?.to_str().ok()?;
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.trim().to_string())
    })
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "quaderno::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "quaderno::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}

/// Replaces bare error bodies with something presentable.
///
/// Handlers fail with a [`crate::application::error::WikiError`], whose
/// response carries an [`ErrorDescriptor`] extension. Script clients get
/// the JSON error envelope; browsers get a themed screen, preferring an
/// admin-authored `wiki:error-<status>` page over the built-in text.
/// Responses without a descriptor pass through untouched.
pub async fn render_error_screens(
    State(state): State<HttpState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let xhr = respond::is_xhr(request.headers());
    let path = request.uri().path().to_string();
    let principal = request
        .extensions()
        .get::<Principal>()
        .cloned()
        .unwrap_or(Principal::Anonymous);

    let mut response = next.run(request).await;
    let Some(descriptor) = response.extensions().get::<ErrorDescriptor>().cloned() else {
        return response;
    };

    let class = if descriptor.kind.status().is_server_error() {
        "5xx"
    } else {
        "4xx"
    };
    counter!(METRIC_HTTP_ERROR, "class" => class).increment(1);

    let mut themed = if xhr {
        respond::error_envelope(&descriptor)
    } else {
        error_screen(&state, &principal, &path, &descriptor).await
    };

    // Carry the diagnostic trail over so the logging layer still sees it.
    if let Some(report) = response.extensions_mut().remove::<ErrorReport>() {
        report.attach(&mut themed);
    }
    themed
}

async fn error_screen(
    state: &HttpState,
    principal: &Principal,
    path: &str,
    descriptor: &ErrorDescriptor,
) -> Response {
    let status = descriptor.kind.status();
    let Ok(settings) = state.settings.load().await else {
        return respond::plain_response(status, descriptor.message.clone());
    };

    let body = match custom_error_body(state, status).await {
        Some(body) => body,
        // Internals stay behind the generic wording on screens.
        None if status.is_server_error() => descriptor
            .kind
            .default_public_text()
            .unwrap_or("Something bad happened.")
            .to_string(),
        None => descriptor.message.clone(),
    };
    let html = state.renderer.render(&body, &settings.interwiki()).html;
    let title = status.canonical_reason().unwrap_or("Error").to_string();

    let Ok(chrome) = state.chrome.assemble(&settings, principal, path).await else {
        return respond::plain_response(status, descriptor.message.clone());
    };
    render_template_response(
        ErrorTemplate {
            view: Layout::new(chrome, ErrorContentView { title, html }),
        },
        status,
    )
}

/// The admin can shadow any error status with a wiki page, e.g.
/// `wiki:error-404`. Lookup failures fall back to the built-in text;
/// this already is the error path.
async fn custom_error_body(state: &HttpState, status: StatusCode) -> Option<String> {
    let title = format!("wiki:error-{}", status.as_u16());
    match state.store.find_by_title(&title).await {
        Ok(Some(page)) => Some(PageSource::parse(&page.body).body().to_string()),
        Ok(None) | Err(_) => None,
    }
}
