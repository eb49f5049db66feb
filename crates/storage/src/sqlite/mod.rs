use std::sync::Arc;
use std::time::Duration;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;

use crate::repository::{ProgressRepository, RoadmapRepository, Storage, StorageError};

mod mapping;
mod migrate;
mod progress_repo;
mod roadmap_repo;

/// Pool and connection settings for the `SQLite` backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqliteOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// How long a writer waits for another writer's lock before failing.
    pub busy_timeout: Duration,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteRepository {
    /// Connect to `SQLite` using the given URL and default options.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established or if
    /// enforcing foreign key constraints fails during setup.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        Self::connect_with(database_url, SqliteOptions::default()).await
    }

    /// Connect to `SQLite` using the given URL and options.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection or per-connection pragmas fail.
    pub async fn connect_with(
        database_url: &str,
        options: SqliteOptions,
    ) -> Result<Self, SqliteInitError> {
        let busy_ms = options.busy_timeout.as_millis();
        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    let busy = format!("PRAGMA busy_timeout = {busy_ms};");
                    sqlx::query(&busy).execute(&mut *conn).await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        tracing::debug!(
            url = database_url,
            max_connections = options.max_connections,
            "sqlite pool ready"
        );
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

/// Map a failed write, turning unique-constraint violations into `Conflict`.
pub(crate) fn write_error(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StorageError::Conflict;
        }
    }
    StorageError::Connection(err.to_string())
}

pub(crate) fn read_error(err: sqlx::Error) -> StorageError {
    StorageError::Connection(err.to_string())
}

impl Storage {
    /// Build a `Storage` backed by `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        Self::sqlite_with(database_url, SqliteOptions::default()).await
    }

    /// Build a `Storage` backed by `SQLite` with explicit pool options.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite_with(
        database_url: &str,
        options: SqliteOptions,
    ) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect_with(database_url, options).await?;
        repo.migrate().await?;
        let roadmaps: Arc<dyn RoadmapRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo);
        Ok(Self { roadmaps, progress })
    }
}
