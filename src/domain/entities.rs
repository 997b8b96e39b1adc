//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Geographic point attached to a page through its `geo:` property.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A wiki page in its current revision.
///
/// The `body` holds the raw page source, including the property header.
/// `labels`, `redirect` and `geo` are denormalized from that header so the
/// store can answer label and map queries without reparsing every page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRecord {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub author_email: Option<String>,
    pub labels: Vec<String>,
    pub redirect: Option<String>,
    pub geo: Option<GeoPoint>,
    pub is_public: Option<bool>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// One historical revision of a page, captured on every save.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevisionRecord {
    pub id: Uuid,
    pub page_title: String,
    pub body: String,
    pub author_email: Option<String>,
    pub created_at: OffsetDateTime,
}

/// A registered reader or editor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub nickname: String,
    pub public_email: Option<String>,
    pub editor_access: bool,
    pub staff_access: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A browser session bound to a user.
///
/// The cookie token carries the session id plus a secret; only the
/// SHA-256 digest of the secret is stored, the cleartext never is.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub secret_digest: Vec<u8>,
    pub user_id: Uuid,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

/// An uploaded image stored on disk and referenced from pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecord {
    pub id: Uuid,
    pub file_name: String,
    pub stored_path: String,
    pub content_type: String,
    pub width: u32,
    pub height: u32,
    pub size_bytes: i64,
    pub checksum: String,
    pub uploaded_by: Option<String>,
    pub created_at: OffsetDateTime,
}
