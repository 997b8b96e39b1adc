//! Sign-in, sign-out, the profile screen and the user list.

use std::collections::HashSet;

use axum::{
    Extension, Form,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header::SET_COOKIE},
    response::Response,
};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::{
    application::{error::WikiError, users::SESSION_COOKIE},
    domain::types::Principal,
    presentation::views::{
        Layout, LoginTemplate, LoginView, ProfileTemplate, UsersTemplate, render_template_response,
    },
};

use super::{HttpState, middleware, respond};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct BackQuery {
    back: Option<String>,
}

pub(super) async fn login_form(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<BackQuery>,
) -> Result<Response, WikiError> {
    let settings = state.settings.load().await?;
    let chrome = state
        .chrome
        .assemble(&settings, &principal, "/w/login")
        .await?;
    Ok(render_template_response(
        LoginTemplate {
            view: Layout::new(
                chrome,
                LoginView {
                    back: local_back(query.back),
                },
            ),
        },
        StatusCode::OK,
    ))
}

#[derive(Debug, Deserialize)]
pub(super) struct LoginForm {
    email: String,
    #[serde(default)]
    back: Option<String>,
}

pub(super) async fn log_in(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Result<Response, WikiError> {
    let issued = state.users.log_in(&form.email).await?;

    let max_age = (issued.expires_at - OffsetDateTime::now_utc())
        .whole_seconds()
        .max(0);
    let cookie = format!(
        "{SESSION_COOKIE}={}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax",
        issued.token
    );

    let back = local_back(form.back);
    let mut response = respond::redirect_response(respond::is_xhr(&headers), &back);
    response.headers_mut().append(
        SET_COOKIE,
        HeaderValue::from_str(&cookie)
            .map_err(|err| WikiError::internal_from("session cookie could not be encoded", err))?,
    );
    Ok(response)
}

pub(super) async fn log_out(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Query(query): Query<BackQuery>,
) -> Result<Response, WikiError> {
    if let Some(token) = middleware::session_cookie(&headers) {
        state.users.log_out(&token).await?;
    }

    let cookie = format!("{SESSION_COOKIE}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax");
    let back = local_back(query.back);
    let mut response = respond::redirect_response(respond::is_xhr(&headers), &back);
    response.headers_mut().append(
        SET_COOKIE,
        HeaderValue::from_str(&cookie)
            .map_err(|err| WikiError::internal_from("session cookie could not be encoded", err))?,
    );
    Ok(response)
}

/// Sign-in and sign-out bounce back to where the visitor was, but only
/// to somewhere on this site.
fn local_back(back: Option<String>) -> String {
    match back {
        Some(back) if back.starts_with('/') && !back.starts_with("//") => back,
        _ => "/".to_string(),
    }
}

pub(super) async fn profile_form(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, WikiError> {
    let view = state.users.profile_view(&principal)?;
    let settings = state.settings.load().await?;
    let chrome = state
        .chrome
        .assemble(&settings, &principal, "/w/profile")
        .await?;
    Ok(render_template_response(
        ProfileTemplate {
            view: Layout::new(chrome, view),
        },
        StatusCode::OK,
    ))
}

#[derive(Debug, Deserialize)]
pub(super) struct ProfileForm {
    #[serde(default)]
    nickname: String,
    // The public address posts under the bare field name.
    #[serde(default)]
    email: String,
}

pub(super) async fn update_profile(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    Form(form): Form<ProfileForm>,
) -> Result<Response, WikiError> {
    state
        .users
        .update_profile(&principal, &form.nickname, &form.email)
        .await?;
    Ok(respond::redirect_response(
        respond::is_xhr(&headers),
        "/w/profile",
    ))
}

pub(super) async fn user_list(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, WikiError> {
    let settings = state.settings.load().await?;
    let view = state
        .users
        .users_screen(&principal, settings.timezone())
        .await?;
    let chrome = state
        .chrome
        .assemble(&settings, &principal, "/w/users")
        .await?;
    Ok(render_template_response(
        UsersTemplate {
            view: Layout::new(chrome, view),
        },
        StatusCode::OK,
    ))
}

pub(super) async fn update_users(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, WikiError> {
    // Checkbox grid: only ticked boxes are submitted at all.
    let checked: HashSet<String> = fields
        .into_iter()
        .filter(|(_, value)| value == "yes")
        .map(|(name, _)| name)
        .collect();
    state.users.apply_access_flags(&principal, &checked).await?;
    Ok(respond::redirect_response(
        respond::is_xhr(&headers),
        "/w/users",
    ))
}

#[cfg(test)]
mod tests {
    use super::local_back;

    #[test]
    fn back_targets_stay_on_site() {
        assert_eq!(local_back(Some("/Welcome".to_string())), "/Welcome");
        assert_eq!(local_back(Some("//evil.example".to_string())), "/");
        assert_eq!(local_back(Some("https://evil.example".to_string())), "/");
        assert_eq!(local_back(None), "/");
    }
}
