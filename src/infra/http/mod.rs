//! The public HTTP surface.
//!
//! One router serves everything: wiki pages at their bare paths, the
//! service screens under `/w/`, feeds, maps and static assets. Every
//! request passes the same middleware stack, so each handler can assume
//! a request id and a resolved principal are present.

mod data;
mod feeds;
mod images;
mod map;
mod middleware;
mod pages;
mod respond;
mod users;

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::get,
};
use sqlx::Error as SqlxError;

use crate::{
    application::{
        access::AccessPolicy,
        archive::ArchiveService,
        context::ContextAssembler,
        error::ErrorReport,
        feeds::FeedService,
        images::ImageService,
        pages::{PageEditService, PageService},
        render::ContentRenderer,
        repos::{JobQueue, PageStore},
        settings::SettingsService,
        site::SiteService,
        sitemap::SitemapService,
        users::UserService,
    },
    cache::{ContentResolver, InvalidationEngine},
    infra::db::PostgresRepositories,
};

/// Everything the handlers need, cloned per request.
#[derive(Clone)]
pub struct HttpState {
    pub settings: Arc<SettingsService>,
    pub chrome: Arc<ContextAssembler>,
    pub pages: Arc<PageService>,
    pub edits: Arc<PageEditService>,
    pub site: Arc<SiteService>,
    pub feeds: Arc<FeedService>,
    pub sitemap: Arc<SitemapService>,
    pub users: Arc<UserService>,
    pub images: Arc<ImageService>,
    pub archive: Arc<ArchiveService>,
    pub resolver: Arc<ContentResolver>,
    pub invalidation: Arc<InvalidationEngine>,
    pub jobs: Arc<dyn JobQueue>,
    pub access: Arc<dyn AccessPolicy>,
    pub store: Arc<dyn PageStore>,
    pub renderer: Arc<dyn ContentRenderer>,
    pub db: Arc<PostgresRepositories>,
}

pub fn build_router(state: HttpState) -> Router {
    // Anything not matched below is treated as a page title.
    let router = Router::new()
        .route("/", get(pages::front_page))
        .route("/robots.txt", get(feeds::robots_txt))
        .route("/sitemap.xml", get(feeds::sitemap))
        .route("/w/backlinks", get(pages::page_backlinks))
        .route("/w/cache/purge", get(data::queue_cache_purge).post(data::run_cache_purge))
        .route("/w/changes", get(pages::recent_changes))
        .route("/w/changes.rss", get(feeds::changes_feed))
        .route("/w/data/export", get(data::export_archive))
        .route("/w/data/import", get(data::import_form).post(data::import_archive))
        .route("/w/edit", get(pages::edit_page).post(pages::save_page))
        .route("/w/history", get(pages::page_history))
        .route("/w/image/file", get(images::image_file))
        .route("/w/image/list", get(images::image_list))
        .route("/w/image/upload", get(images::upload_form).post(images::upload_image))
        .route("/w/image/view", get(images::image_detail))
        .route("/w/index", get(pages::page_index))
        .route("/w/index.rss", get(feeds::index_feed))
        .route("/w/interwiki", get(pages::interwiki_map))
        .route("/w/login", get(users::login_form).post(users::log_in))
        .route("/w/logout", get(users::log_out))
        .route("/w/map", get(map::page_map))
        .route("/w/pages.rss", get(feeds::label_feed))
        .route("/w/pages/map", get(map::label_map))
        .route("/w/pages/map-data", get(map::map_data))
        .route("/w/profile", get(users::profile_form).post(users::update_profile))
        .route("/w/users", get(users::user_list).post(users::update_users))
        .route("/_health/db", get(db_health))
        .route("/static/{*path}", get(crate::infra::assets::serve_static))
        .fallback(get(pages::any_page));

    // Layers run top-down for requests in reverse registration order:
    // request context, then principal, then logging, then error theming.
    router
        .with_state(state.clone())
        .layer(from_fn_with_state(
            state.clone(),
            middleware::render_error_screens,
        ))
        .layer(from_fn(middleware::log_responses))
        .layer(from_fn_with_state(state, middleware::resolve_principal))
        .layer(from_fn(middleware::set_request_context))
}

async fn db_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.db.health_check().await)
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
