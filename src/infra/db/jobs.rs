use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;

use crate::application::repos::{JobQueue, RepoError};
use crate::domain::types::JobType;

use super::{PostgresRepositories, map_sqlx_error};

const MAX_ATTEMPTS: i32 = 5;
const DEFAULT_PRIORITY: i32 = 0;

#[async_trait]
impl JobQueue for PostgresRepositories {
    /// Hands a job to the apalis queue through its `push_job` SQL function,
    /// so rows are indistinguishable from worker-enqueued ones.
    async fn enqueue(&self, job_type: JobType, payload: Value) -> Result<String, RepoError> {
        let id: String =
            sqlx::query_scalar("SELECT (apalis.push_job($1, $2::json, $3, $4, $5, $6)).id")
                .bind(job_type.as_str())
                .bind(&payload)
                .bind("Pending")
                .bind(OffsetDateTime::now_utc())
                .bind(MAX_ATTEMPTS)
                .bind(DEFAULT_PRIORITY)
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        Ok(id)
    }
}
