use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    RepoError, UpdateAccessParams, UpdateProfileParams, UserStore,
};
use crate::domain::entities::{SessionRecord, UserRecord};

use super::{PostgresRepositories, map_sqlx_error};

const USER_COLUMNS: &str =
    "id, email, nickname, public_email, editor_access, staff_access, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    nickname: String,
    public_email: Option<String>,
    editor_access: bool,
    staff_access: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            nickname: row.nickname,
            public_email: row.public_email,
            editor_access: row.editor_access,
            staff_access: row.staff_access,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SessionUserRow {
    session_id: Uuid,
    secret_digest: Vec<u8>,
    user_id: Uuid,
    session_created_at: OffsetDateTime,
    expires_at: OffsetDateTime,
    email: String,
    nickname: String,
    public_email: Option<String>,
    editor_access: bool,
    staff_access: bool,
    user_created_at: OffsetDateTime,
    user_updated_at: OffsetDateTime,
}

impl SessionUserRow {
    fn split(self) -> (SessionRecord, UserRecord) {
        let session = SessionRecord {
            id: self.session_id,
            secret_digest: self.secret_digest,
            user_id: self.user_id,
            created_at: self.session_created_at,
            expires_at: self.expires_at,
        };
        let user = UserRecord {
            id: self.user_id,
            email: self.email,
            nickname: self.nickname,
            public_email: self.public_email,
            editor_access: self.editor_access,
            staff_access: self.staff_access,
            created_at: self.user_created_at,
            updated_at: self.user_updated_at,
        };

        (session, user)
    }
}

#[async_trait]
impl UserStore for PostgresRepositories {
    async fn get_or_create(&self, email: &str) -> Result<UserRecord, RepoError> {
        let nickname = email.split('@').next().unwrap_or(email);
        let sql = format!(
            "INSERT INTO users (id, email, nickname, editor_access, staff_access, \
                 created_at, updated_at) \
             VALUES ($1, $2, $3, FALSE, FALSE, $4, $4) \
             ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email \
             RETURNING {USER_COLUMNS}"
        );

        // The self-assignment makes RETURNING yield the existing row on
        // conflict; DO NOTHING would return nothing.
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(email)
            .bind(nickname)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn list_all(&self) -> Result<Vec<UserRecord>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_access(&self, params: UpdateAccessParams) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE users \
                SET editor_access = $2, staff_access = $3, updated_at = $4 \
              WHERE id = $1",
        )
        .bind(params.id)
        .bind(params.editor_access)
        .bind(params.staff_access)
        .bind(OffsetDateTime::now_utc())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update_profile(&self, params: UpdateProfileParams) -> Result<UserRecord, RepoError> {
        let sql = format!(
            "UPDATE users \
                SET nickname = $2, public_email = $3, updated_at = $4 \
              WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(params.id)
            .bind(&params.nickname)
            .bind(params.public_email.as_deref())
            .bind(OffsetDateTime::now_utc())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn create_session(&self, session: SessionRecord) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO sessions (id, secret_digest, user_id, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(session.id)
        .bind(&session.secret_digest)
        .bind(session.user_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_session(
        &self,
        id: Uuid,
    ) -> Result<Option<(SessionRecord, UserRecord)>, RepoError> {
        let row = sqlx::query_as::<_, SessionUserRow>(
            "SELECT s.id AS session_id, \
                    s.secret_digest, \
                    s.user_id, \
                    s.created_at AS session_created_at, \
                    s.expires_at, \
                    u.email, \
                    u.nickname, \
                    u.public_email, \
                    u.editor_access, \
                    u.staff_access, \
                    u.created_at AS user_created_at, \
                    u.updated_at AS user_updated_at \
               FROM sessions s \
               JOIN users u ON u.id = s.user_id \
              WHERE s.id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(SessionUserRow::split))
    }

    async fn delete_session(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_expired_sessions(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
