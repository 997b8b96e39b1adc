use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{ImageStore, RepoError};
use crate::domain::entities::ImageRecord;

use super::{PostgresRepositories, map_sqlx_error};

const IMAGE_COLUMNS: &str = "id, file_name, stored_path, content_type, width, height, \
     size_bytes, checksum, uploaded_by, created_at";

#[derive(sqlx::FromRow)]
struct ImageRow {
    id: Uuid,
    file_name: String,
    stored_path: String,
    content_type: String,
    width: i32,
    height: i32,
    size_bytes: i64,
    checksum: String,
    uploaded_by: Option<String>,
    created_at: OffsetDateTime,
}

impl From<ImageRow> for ImageRecord {
    fn from(row: ImageRow) -> Self {
        Self {
            id: row.id,
            file_name: row.file_name,
            stored_path: row.stored_path,
            content_type: row.content_type,
            width: row.width.max(0) as u32,
            height: row.height.max(0) as u32,
            size_bytes: row.size_bytes,
            checksum: row.checksum,
            uploaded_by: row.uploaded_by,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ImageStore for PostgresRepositories {
    async fn insert_image(&self, record: ImageRecord) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO images (id, file_name, stored_path, content_type, width, height, \
                 size_bytes, checksum, uploaded_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(record.id)
        .bind(&record.file_name)
        .bind(&record.stored_path)
        .bind(&record.content_type)
        .bind(record.width as i32)
        .bind(record.height as i32)
        .bind(record.size_bytes)
        .bind(&record.checksum)
        .bind(record.uploaded_by.as_deref())
        .bind(record.created_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_image(&self, id: Uuid) -> Result<Option<ImageRecord>, RepoError> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = $1");
        let row = sqlx::query_as::<_, ImageRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<ImageRecord>, RepoError> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images ORDER BY created_at DESC LIMIT $1");
        let rows = sqlx::query_as::<_, ImageRow>(&sql)
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
