//! Postgres-backed store implementations.
//!
//! One [`PostgresRepositories`] value implements every store trait the
//! application layer consumes, so wiring is a handful of `Arc` clones.

mod images;
mod jobs;
mod pages;
mod users;

use std::time::Duration;

use sqlx::{
    migrate::MigrateError,
    postgres::{PgPool, PgPoolOptions},
};

use crate::application::repos::RepoError;

/// How long a request may wait for a pool connection before the wiki
/// reports itself over capacity.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: PgPool,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Open a pool sized for one of the two runtime roles, HTTP or jobs.
    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
        sqlx::migrate!("./migrations").run(pool).await
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Collapses driver errors into the two cases callers can act on: a
/// saturated or unreachable pool reads as `Unavailable`, anything else
/// as `Persistence`.
pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepoError::unavailable(err)
        }
        other => RepoError::from_persistence(other),
    }
}
