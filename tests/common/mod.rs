//! Shared harness for the integration suites: in-memory store fakes
//! that mirror the Postgres adapters' semantics, and a [`TestWiki`]
//! that wires them into the real router.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tempfile::TempDir;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use quaderno::application::access::{AccessPolicy, DefaultAccessPolicy};
use quaderno::application::archive::ArchiveService;
use quaderno::application::context::ContextAssembler;
use quaderno::application::feeds::FeedService;
use quaderno::application::images::ImageService;
use quaderno::application::pages::{PageEditService, PageService};
use quaderno::application::render::{ComrakContentRenderer, ContentRenderer};
use quaderno::application::repos::{
    ImageStore, JobQueue, PageStore, RepoError, SavePageParams, UpdateAccessParams,
    UpdateProfileParams, UserStore,
};
use quaderno::application::settings::SettingsService;
use quaderno::application::site::SiteService;
use quaderno::application::sitemap::SitemapService;
use quaderno::application::users::UserService;
use quaderno::cache::{
    CacheConfig, CacheStore, ContentResolver, InvalidationEngine, MemoryCacheStore,
};
use quaderno::domain::entities::{
    ImageRecord, PageRecord, RevisionRecord, SessionRecord, UserRecord,
};
use quaderno::domain::source::PageSource;
use quaderno::domain::types::JobType;
use quaderno::infra::db::PostgresRepositories;
use quaderno::infra::http::{HttpState, build_router};
use quaderno::infra::media::MediaStorage;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const BASE_URL: &str = "http://wiki.example.com";

/// In-memory [`PageStore`] with the same derivation and ordering rules
/// as the Postgres adapter: labels, redirect, geo and visibility come
/// from the body header, upserts keep `created_at` and the row id, and
/// deleting a page keeps its revisions.
#[derive(Default)]
pub struct MemoryPages {
    inner: Mutex<PagesInner>,
    offline: AtomicBool,
}

#[derive(Default)]
struct PagesInner {
    pages: BTreeMap<String, PageRecord>,
    revisions: Vec<RevisionRecord>,
    links: Vec<(String, String)>,
}

impl MemoryPages {
    /// Makes every later call fail as if the pool were exhausted.
    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), RepoError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RepoError::unavailable("connection pool timed out"))
        } else {
            Ok(())
        }
    }

    /// Overwrites a stored body behind the cache's back, without a
    /// revision or timestamp change, so tests can tell a cached read
    /// from a fresh one.
    pub async fn rewrite_body(&self, title: &str, body: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(page) = inner.pages.get_mut(title) {
            page.body = body.to_string();
        }
    }

    pub async fn revision_count(&self, title: &str) -> usize {
        let inner = self.inner.lock().await;
        inner
            .revisions
            .iter()
            .filter(|revision| revision.page_title == title)
            .count()
    }

    pub async fn titles(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.pages.keys().cloned().collect()
    }
}

#[async_trait]
impl PageStore for MemoryPages {
    async fn find_by_title(&self, title: &str) -> Result<Option<PageRecord>, RepoError> {
        self.check_online()?;
        let inner = self.inner.lock().await;
        Ok(inner.pages.get(title).cloned())
    }

    async fn list_all(&self) -> Result<Vec<PageRecord>, RepoError> {
        self.check_online()?;
        let inner = self.inner.lock().await;
        Ok(inner.pages.values().cloned().collect())
    }

    async fn list_public(&self) -> Result<Vec<PageRecord>, RepoError> {
        self.check_online()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .pages
            .values()
            .filter(|page| page.is_public == Some(true))
            .cloned()
            .collect())
    }

    async fn recently_added(&self, limit: u32) -> Result<Vec<PageRecord>, RepoError> {
        self.check_online()?;
        let inner = self.inner.lock().await;
        let mut pages: Vec<PageRecord> = inner.pages.values().cloned().collect();
        pages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        pages.truncate(limit as usize);
        Ok(pages)
    }

    async fn recent_by_label(
        &self,
        label: &str,
        limit: u32,
    ) -> Result<Vec<PageRecord>, RepoError> {
        self.check_online()?;
        let inner = self.inner.lock().await;
        let mut pages: Vec<PageRecord> = inner
            .pages
            .values()
            .filter(|page| page.labels.iter().any(|candidate| candidate == label))
            .cloned()
            .collect();
        pages.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        pages.truncate(limit as usize);
        Ok(pages)
    }

    async fn by_label(&self, label: &str) -> Result<Vec<PageRecord>, RepoError> {
        self.check_online()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .pages
            .values()
            .filter(|page| page.labels.iter().any(|candidate| candidate == label))
            .cloned()
            .collect())
    }

    async fn changes(&self, limit: u32) -> Result<Vec<PageRecord>, RepoError> {
        self.check_online()?;
        let inner = self.inner.lock().await;
        let mut pages: Vec<PageRecord> = inner.pages.values().cloned().collect();
        pages.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        pages.truncate(limit as usize);
        Ok(pages)
    }

    async fn with_geo(&self, label: Option<&str>) -> Result<Vec<PageRecord>, RepoError> {
        self.check_online()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .pages
            .values()
            .filter(|page| page.geo.is_some())
            .filter(|page| match label {
                Some(label) => page.labels.iter().any(|candidate| candidate == label),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn find_revision(&self, id: Uuid) -> Result<Option<RevisionRecord>, RepoError> {
        self.check_online()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .revisions
            .iter()
            .find(|revision| revision.id == id)
            .cloned())
    }

    async fn history(&self, title: &str, limit: u32) -> Result<Vec<RevisionRecord>, RepoError> {
        self.check_online()?;
        let inner = self.inner.lock().await;
        let mut revisions: Vec<RevisionRecord> = inner
            .revisions
            .iter()
            .filter(|revision| revision.page_title == title)
            .cloned()
            .collect();
        revisions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        revisions.truncate(limit as usize);
        Ok(revisions)
    }

    async fn backlinks_for(&self, title: &str) -> Result<Vec<String>, RepoError> {
        self.check_online()?;
        let inner = self.inner.lock().await;
        let mut sources: Vec<String> = inner
            .links
            .iter()
            .filter(|(_, target)| target == title)
            .map(|(source, _)| source.clone())
            .collect();
        sources.sort();
        Ok(sources)
    }

    async fn save_page(&self, params: SavePageParams) -> Result<PageRecord, RepoError> {
        self.check_online()?;
        let source = PageSource::parse(&params.body);
        let is_public = if source.is_public() {
            Some(true)
        } else if source.is_private() {
            Some(false)
        } else {
            None
        };
        let saved_at = params.updated_at.unwrap_or_else(OffsetDateTime::now_utc);

        let mut inner = self.inner.lock().await;
        let (id, created_at) = match inner.pages.get(&params.title) {
            Some(existing) => (existing.id, existing.created_at),
            None => (Uuid::new_v4(), saved_at),
        };
        let record = PageRecord {
            id,
            title: params.title.clone(),
            body: params.body.clone(),
            author_email: params.author_email.clone(),
            labels: source.labels(),
            redirect: source.redirect().map(str::to_string),
            geo: source.geo(),
            is_public,
            created_at,
            updated_at: saved_at,
        };
        inner.pages.insert(params.title.clone(), record.clone());
        inner.revisions.push(RevisionRecord {
            id: Uuid::new_v4(),
            page_title: params.title.clone(),
            body: params.body.clone(),
            author_email: params.author_email,
            created_at: saved_at,
        });
        inner.links.retain(|(source, _)| source != &params.title);
        for target in params.links {
            inner.links.push((params.title.clone(), target));
        }
        Ok(record)
    }

    async fn delete_page(&self, title: &str) -> Result<bool, RepoError> {
        self.check_online()?;
        let mut inner = self.inner.lock().await;
        inner.links.retain(|(source, _)| source != title);
        Ok(inner.pages.remove(title).is_some())
    }
}

/// In-memory [`UserStore`]. Nicknames default to the email's local
/// part, matching the Postgres adapter.
#[derive(Default)]
pub struct MemoryUsers {
    inner: Mutex<UsersInner>,
}

#[derive(Default)]
struct UsersInner {
    users: Vec<UserRecord>,
    sessions: Vec<SessionRecord>,
}

impl MemoryUsers {
    pub async fn session_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }
}

#[async_trait]
impl UserStore for MemoryUsers {
    async fn get_or_create(&self, email: &str) -> Result<UserRecord, RepoError> {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.iter().find(|user| user.email == email) {
            return Ok(user.clone());
        }
        let now = OffsetDateTime::now_utc();
        let user = UserRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            nickname: email.split('@').next().unwrap_or(email).to_string(),
            public_email: None,
            editor_access: false,
            staff_access: false,
            created_at: now,
            updated_at: now,
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.iter().find(|user| user.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.iter().find(|user| user.id == id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<UserRecord>, RepoError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.clone())
    }

    async fn update_access(&self, params: UpdateAccessParams) -> Result<(), RepoError> {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.iter_mut().find(|user| user.id == params.id) {
            user.editor_access = params.editor_access;
            user.staff_access = params.staff_access;
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn update_profile(&self, params: UpdateProfileParams) -> Result<UserRecord, RepoError> {
        let mut inner = self.inner.lock().await;
        let user = inner
            .users
            .iter_mut()
            .find(|user| user.id == params.id)
            .ok_or_else(|| RepoError::from_persistence("no such user"))?;
        user.nickname = params.nickname;
        user.public_email = params.public_email;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn create_session(&self, session: SessionRecord) -> Result<(), RepoError> {
        let mut inner = self.inner.lock().await;
        inner.sessions.push(session);
        Ok(())
    }

    async fn find_session(
        &self,
        id: Uuid,
    ) -> Result<Option<(SessionRecord, UserRecord)>, RepoError> {
        let inner = self.inner.lock().await;
        let Some(session) = inner.sessions.iter().find(|session| session.id == id) else {
            return Ok(None);
        };
        let Some(user) = inner.users.iter().find(|user| user.id == session.user_id) else {
            return Ok(None);
        };
        Ok(Some((session.clone(), user.clone())))
    }

    async fn delete_session(&self, id: Uuid) -> Result<(), RepoError> {
        let mut inner = self.inner.lock().await;
        inner.sessions.retain(|session| session.id != id);
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let mut inner = self.inner.lock().await;
        let before = inner.sessions.len();
        inner.sessions.retain(|session| session.expires_at > now);
        Ok((before - inner.sessions.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryImages {
    images: Mutex<Vec<ImageRecord>>,
}

#[async_trait]
impl ImageStore for MemoryImages {
    async fn insert_image(&self, record: ImageRecord) -> Result<(), RepoError> {
        self.images.lock().await.push(record);
        Ok(())
    }

    async fn find_image(&self, id: Uuid) -> Result<Option<ImageRecord>, RepoError> {
        let images = self.images.lock().await;
        Ok(images.iter().find(|image| image.id == id).cloned())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<ImageRecord>, RepoError> {
        let images = self.images.lock().await;
        let mut recent: Vec<ImageRecord> = images.clone();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit as usize);
        Ok(recent)
    }
}

/// Records enqueued jobs instead of running them.
#[derive(Default)]
pub struct RecordingJobs {
    enqueued: Mutex<Vec<(JobType, Value)>>,
}

impl RecordingJobs {
    pub async fn enqueued(&self) -> Vec<(JobType, Value)> {
        self.enqueued.lock().await.clone()
    }
}

#[async_trait]
impl JobQueue for RecordingJobs {
    async fn enqueue(&self, job_type: JobType, payload: Value) -> Result<String, RepoError> {
        self.enqueued.lock().await.push((job_type, payload));
        Ok(Uuid::new_v4().to_string())
    }
}

/// A complete wiki over fakes, exposing its router plus the handles
/// tests poke at directly.
pub struct TestWiki {
    pub router: Router,
    pub pages: Arc<MemoryPages>,
    pub users: Arc<MemoryUsers>,
    pub images: Arc<MemoryImages>,
    pub jobs: Arc<RecordingJobs>,
    pub cache: Arc<MemoryCacheStore>,
    pub archive: Arc<ArchiveService>,
    pub settings: Arc<SettingsService>,
    pub invalidation: Arc<InvalidationEngine>,
    media_dir: TempDir,
}

impl TestWiki {
    pub fn new() -> Self {
        Self::with_cache(CacheConfig::default())
    }

    pub fn with_cache(cache_config: CacheConfig) -> Self {
        let pages = Arc::new(MemoryPages::default());
        let users = Arc::new(MemoryUsers::default());
        let images = Arc::new(MemoryImages::default());
        let jobs = Arc::new(RecordingJobs::default());

        let store: Arc<dyn PageStore> = pages.clone();
        let user_store: Arc<dyn UserStore> = users.clone();
        let image_store: Arc<dyn ImageStore> = images.clone();
        let job_queue: Arc<dyn JobQueue> = jobs.clone();

        let access: Arc<dyn AccessPolicy> =
            Arc::new(DefaultAccessPolicy::new(vec![ADMIN_EMAIL.to_string()]));
        let renderer: Arc<dyn ContentRenderer> = Arc::new(ComrakContentRenderer::new());

        let cache = Arc::new(MemoryCacheStore::new(&cache_config));
        let cache_store: Arc<dyn CacheStore> = cache.clone();
        let resolver = Arc::new(ContentResolver::new(cache_store.clone(), cache_config.enabled));
        let invalidation = Arc::new(InvalidationEngine::new(cache_store, store.clone()));

        let media_dir = tempfile::tempdir().expect("media tempdir");
        let media = Arc::new(
            MediaStorage::new(media_dir.path().to_path_buf()).expect("media storage"),
        );

        let settings = Arc::new(SettingsService::new(store.clone()));
        let chrome = Arc::new(ContextAssembler::new(
            store.clone(),
            access.clone(),
            renderer.clone(),
            BASE_URL.to_string(),
        ));
        let page_service = Arc::new(PageService::new(
            store.clone(),
            access.clone(),
            renderer.clone(),
        ));
        let edits = Arc::new(PageEditService::new(
            store.clone(),
            access.clone(),
            renderer.clone(),
            invalidation.clone(),
        ));
        let site = Arc::new(SiteService::new(store.clone(), access.clone()));
        let feeds = Arc::new(FeedService::new(
            store.clone(),
            access.clone(),
            BASE_URL.to_string(),
        ));
        let sitemap = Arc::new(SitemapService::new(store.clone(), BASE_URL.to_string()));
        let user_service = Arc::new(UserService::new(
            user_store,
            access.clone(),
            job_queue.clone(),
        ));
        let image_service = Arc::new(ImageService::new(
            image_store,
            store.clone(),
            access.clone(),
            media,
        ));
        let archive = Arc::new(ArchiveService::new(
            store.clone(),
            access.clone(),
            renderer.clone(),
            invalidation.clone(),
        ));

        // Nothing in these tests reaches the database; the pool only has
        // to exist so the state can be built.
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy("postgres://unused@127.0.0.1:9/unused")
            .expect("lazy pool");
        let db = Arc::new(PostgresRepositories::new(pool));

        let state = HttpState {
            settings: settings.clone(),
            chrome,
            pages: page_service,
            edits,
            site,
            feeds,
            sitemap,
            users: user_service,
            images: image_service,
            archive: archive.clone(),
            resolver,
            invalidation: invalidation.clone(),
            jobs: job_queue,
            access,
            store,
            renderer,
            db,
        };

        TestWiki {
            router: build_router(state),
            pages,
            users,
            images,
            jobs,
            cache,
            archive,
            settings,
            invalidation,
            media_dir,
        }
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.request(Request::get(uri).body(Body::empty()).expect("request"))
            .await
    }

    pub async fn get_xhr(&self, uri: &str) -> Response<Body> {
        self.request(
            Request::get(uri)
                .header("X-Requested-With", "XMLHttpRequest")
                .body(Body::empty())
                .expect("request"),
        )
        .await
    }

    pub async fn get_as(&self, uri: &str, cookie: &str) -> Response<Body> {
        self.request(
            Request::get(uri)
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .expect("request"),
        )
        .await
    }

    pub async fn post_form(
        &self,
        uri: &str,
        body: &str,
        cookie: Option<&str>,
    ) -> Response<Body> {
        let mut builder = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.request(builder.body(Body::from(body.to_string())).expect("request"))
            .await
    }

    pub async fn post_form_xhr(&self, uri: &str, body: &str, cookie: &str) -> Response<Body> {
        self.request(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(header::COOKIE, cookie)
                .header("X-Requested-With", "XMLHttpRequest")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await
    }

    /// Signs in through the real login route and returns the session
    /// cookie pair for later requests.
    pub async fn sign_in(&self, email: &str) -> String {
        let body = format!("email={}&back=/", email.replace('@', "%40"));
        let response = self.post_form("/w/login", &body, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("session cookie")
            .to_str()
            .expect("cookie string");
        cookie
            .split(';')
            .next()
            .expect("cookie pair")
            .to_string()
    }

    /// Stores a page directly, bypassing access checks and the cache.
    pub async fn seed_page(&self, title: &str, body: &str) -> PageRecord {
        self.pages
            .save_page(SavePageParams {
                title: title.to_string(),
                body: body.to_string(),
                author_email: None,
                links: Vec::new(),
                updated_at: None,
            })
            .await
            .expect("seed page")
    }
}

pub async fn read_body(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

pub fn content_type(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .expect("content type")
        .to_str()
        .expect("content type string")
        .to_string()
}
