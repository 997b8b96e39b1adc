use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{PageStore, RepoError, SavePageParams};
use crate::domain::entities::{GeoPoint, PageRecord, RevisionRecord};
use crate::domain::source::PageSource;

use super::{PostgresRepositories, map_sqlx_error};

const PAGE_COLUMNS: &str = "id, title, body, author_email, labels, redirect, \
     geo_lat, geo_lng, is_public, created_at, updated_at";

const REVISION_COLUMNS: &str = "id, page_title, body, author_email, created_at";

fn select_pages(tail: &str) -> String {
    format!("SELECT {PAGE_COLUMNS} FROM pages {tail}")
}

#[derive(sqlx::FromRow)]
struct PageRow {
    id: Uuid,
    title: String,
    body: String,
    author_email: Option<String>,
    labels: Vec<String>,
    redirect: Option<String>,
    geo_lat: Option<f64>,
    geo_lng: Option<f64>,
    is_public: Option<bool>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PageRow> for PageRecord {
    fn from(row: PageRow) -> Self {
        let geo = match (row.geo_lat, row.geo_lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        };

        Self {
            id: row.id,
            title: row.title,
            body: row.body,
            author_email: row.author_email,
            labels: row.labels,
            redirect: row.redirect,
            geo,
            is_public: row.is_public,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RevisionRow {
    id: Uuid,
    page_title: String,
    body: String,
    author_email: Option<String>,
    created_at: OffsetDateTime,
}

impl From<RevisionRow> for RevisionRecord {
    fn from(row: RevisionRow) -> Self {
        Self {
            id: row.id,
            page_title: row.page_title,
            body: row.body,
            author_email: row.author_email,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl PageStore for PostgresRepositories {
    async fn find_by_title(&self, title: &str) -> Result<Option<PageRecord>, RepoError> {
        let sql = select_pages("WHERE title = $1");
        let row = sqlx::query_as::<_, PageRow>(&sql)
            .bind(title)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn list_all(&self) -> Result<Vec<PageRecord>, RepoError> {
        let sql = select_pages("ORDER BY title");
        let rows = sqlx::query_as::<_, PageRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_public(&self) -> Result<Vec<PageRecord>, RepoError> {
        let sql = select_pages("WHERE is_public IS TRUE ORDER BY title");
        let rows = sqlx::query_as::<_, PageRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn recently_added(&self, limit: u32) -> Result<Vec<PageRecord>, RepoError> {
        let sql = select_pages("ORDER BY created_at DESC LIMIT $1");
        let rows = sqlx::query_as::<_, PageRow>(&sql)
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn recent_by_label(
        &self,
        label: &str,
        limit: u32,
    ) -> Result<Vec<PageRecord>, RepoError> {
        let sql = select_pages("WHERE $1 = ANY(labels) ORDER BY updated_at DESC LIMIT $2");
        let rows = sqlx::query_as::<_, PageRow>(&sql)
            .bind(label)
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn by_label(&self, label: &str) -> Result<Vec<PageRecord>, RepoError> {
        let sql = select_pages("WHERE $1 = ANY(labels) ORDER BY title");
        let rows = sqlx::query_as::<_, PageRow>(&sql)
            .bind(label)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn changes(&self, limit: u32) -> Result<Vec<PageRecord>, RepoError> {
        let sql = select_pages("ORDER BY updated_at DESC LIMIT $1");
        let rows = sqlx::query_as::<_, PageRow>(&sql)
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn with_geo(&self, label: Option<&str>) -> Result<Vec<PageRecord>, RepoError> {
        let mut qb = QueryBuilder::new(select_pages(
            "WHERE geo_lat IS NOT NULL AND geo_lng IS NOT NULL",
        ));

        if let Some(label) = label {
            qb.push(" AND ");
            qb.push_bind(label.to_string());
            qb.push(" = ANY(labels)");
        }

        qb.push(" ORDER BY title");

        let rows = qb
            .build_query_as::<PageRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_revision(&self, id: Uuid) -> Result<Option<RevisionRecord>, RepoError> {
        let sql = format!("SELECT {REVISION_COLUMNS} FROM revisions WHERE id = $1");
        let row = sqlx::query_as::<_, RevisionRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn history(&self, title: &str, limit: u32) -> Result<Vec<RevisionRecord>, RepoError> {
        let sql = format!(
            "SELECT {REVISION_COLUMNS} FROM revisions \
             WHERE page_title = $1 ORDER BY created_at DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, RevisionRow>(&sql)
            .bind(title)
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn backlinks_for(&self, title: &str) -> Result<Vec<String>, RepoError> {
        sqlx::query_scalar(
            "SELECT source_title FROM page_links WHERE target_title = $1 ORDER BY source_title",
        )
        .bind(title)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn save_page(&self, params: SavePageParams) -> Result<PageRecord, RepoError> {
        let source = PageSource::parse(&params.body);
        let labels = source.labels();
        let redirect = source.redirect().map(str::to_string);
        let geo = source.geo();
        let is_public = if source.is_public() {
            Some(true)
        } else if source.is_private() {
            Some(false)
        } else {
            None
        };
        let saved_at = params.updated_at.unwrap_or_else(OffsetDateTime::now_utc);

        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        let sql = format!(
            "INSERT INTO pages (id, title, body, author_email, labels, redirect, \
                 geo_lat, geo_lng, is_public, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10) \
             ON CONFLICT (title) DO UPDATE \
                SET body = EXCLUDED.body, \
                    author_email = EXCLUDED.author_email, \
                    labels = EXCLUDED.labels, \
                    redirect = EXCLUDED.redirect, \
                    geo_lat = EXCLUDED.geo_lat, \
                    geo_lng = EXCLUDED.geo_lng, \
                    is_public = EXCLUDED.is_public, \
                    updated_at = EXCLUDED.updated_at \
             RETURNING {PAGE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PageRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&params.title)
            .bind(&params.body)
            .bind(params.author_email.as_deref())
            .bind(&labels)
            .bind(redirect.as_deref())
            .bind(geo.map(|point| point.lat))
            .bind(geo.map(|point| point.lng))
            .bind(is_public)
            .bind(saved_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        sqlx::query(
            "INSERT INTO revisions (id, page_title, body, author_email, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(&params.title)
        .bind(&params.body)
        .bind(params.author_email.as_deref())
        .bind(saved_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM page_links WHERE source_title = $1")
            .bind(&params.title)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if !params.links.is_empty() {
            sqlx::query(
                "INSERT INTO page_links (source_title, target_title) \
                 SELECT $1, unnest($2::text[]) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(&params.title)
            .bind(&params.links)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn delete_page(&self, title: &str) -> Result<bool, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        // Revisions stay; a deleted page's history is still browsable.
        sqlx::query("DELETE FROM page_links WHERE source_title = $1")
            .bind(title)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let result = sqlx::query("DELETE FROM pages WHERE title = $1")
            .bind(title)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}
