//! Store traits describing persistence adapters.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{
    ImageRecord, PageRecord, RevisionRecord, SessionRecord, UserRecord,
};
use crate::domain::types::JobType;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// A page save. Labels, redirect and geo columns are derived from the body
/// by the store; `links` carries the wiki link targets extracted from the
/// rendered body so backlinks can be answered without a full-table scan.
#[derive(Debug, Clone)]
pub struct SavePageParams {
    pub title: String,
    pub body: String,
    pub author_email: Option<String>,
    pub links: Vec<String>,
    /// Preserved timestamp for imported pages; `None` means "now".
    pub updated_at: Option<OffsetDateTime>,
}

#[async_trait]
pub trait PageStore: Send + Sync {
    async fn find_by_title(&self, title: &str) -> Result<Option<PageRecord>, RepoError>;

    async fn list_all(&self) -> Result<Vec<PageRecord>, RepoError>;

    /// Pages explicitly marked `public: yes`, for closed wikis.
    async fn list_public(&self) -> Result<Vec<PageRecord>, RepoError>;

    async fn recently_added(&self, limit: u32) -> Result<Vec<PageRecord>, RepoError>;

    /// Pages carrying `label`, newest first.
    async fn recent_by_label(&self, label: &str, limit: u32)
        -> Result<Vec<PageRecord>, RepoError>;

    /// All pages carrying `label`, ordered by title.
    async fn by_label(&self, label: &str) -> Result<Vec<PageRecord>, RepoError>;

    /// Pages ordered by update time, newest first.
    async fn changes(&self, limit: u32) -> Result<Vec<PageRecord>, RepoError>;

    /// Pages with coordinates, optionally restricted to one label.
    async fn with_geo(&self, label: Option<&str>) -> Result<Vec<PageRecord>, RepoError>;

    async fn find_revision(&self, id: Uuid) -> Result<Option<RevisionRecord>, RepoError>;

    async fn history(&self, title: &str, limit: u32) -> Result<Vec<RevisionRecord>, RepoError>;

    /// Titles of pages that link to `title`.
    async fn backlinks_for(&self, title: &str) -> Result<Vec<String>, RepoError>;

    async fn save_page(&self, params: SavePageParams) -> Result<PageRecord, RepoError>;

    /// Returns whether a page was actually removed.
    async fn delete_page(&self, title: &str) -> Result<bool, RepoError>;
}

#[derive(Debug, Clone)]
pub struct UpdateProfileParams {
    pub id: Uuid,
    pub nickname: String,
    pub public_email: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct UpdateAccessParams {
    pub id: Uuid,
    pub editor_access: bool,
    pub staff_access: bool,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Looks up a user by email, creating the record on first sight.
    async fn get_or_create(&self, email: &str) -> Result<UserRecord, RepoError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;

    async fn list_all(&self) -> Result<Vec<UserRecord>, RepoError>;

    async fn update_access(&self, params: UpdateAccessParams) -> Result<(), RepoError>;

    async fn update_profile(&self, params: UpdateProfileParams) -> Result<UserRecord, RepoError>;

    async fn create_session(&self, session: SessionRecord) -> Result<(), RepoError>;

    async fn find_session(
        &self,
        id: Uuid,
    ) -> Result<Option<(SessionRecord, UserRecord)>, RepoError>;

    async fn delete_session(&self, id: Uuid) -> Result<(), RepoError>;

    async fn delete_expired_sessions(&self, now: OffsetDateTime) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn insert_image(&self, record: ImageRecord) -> Result<(), RepoError>;

    async fn find_image(&self, id: Uuid) -> Result<Option<ImageRecord>, RepoError>;

    async fn list_recent(&self, limit: u32) -> Result<Vec<ImageRecord>, RepoError>;
}

/// Deferred work accepted for background execution.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job_type: JobType, payload: Value) -> Result<String, RepoError>;
}
