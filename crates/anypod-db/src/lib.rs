//! Database layer for Anypod
//!
//! SQLite via sqlx, WAL mode, single local file owned by the daemon. All
//! mutations go through the narrow repo methods; callers never issue SQL.

mod error;
mod repos;

pub use error::DbError;
pub use repos::*;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Database connection wrapper
#[derive(Clone)]
pub struct Database(SqlitePool);

impl Database {
    /// Open (creating if necessary) the database at `<db_dir>/anypod.db` and
    /// apply the schema and triggers.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the connection or schema application fails
    pub async fn open(db_dir: &Path) -> Result<Self, DbError> {
        let db_path = db_dir.join("anypod.db");
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(60));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA_SQL).execute(&pool).await?;
        Ok(Self(pool))
    }

    /// Open an in-memory database with the schema applied (tests and debug
    /// tooling).
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the connection or schema application fails
    pub async fn open_in_memory() -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(sqlx::Error::from)?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::raw_sql(SCHEMA_SQL).execute(&pool).await?;
        Ok(Self(pool))
    }

    /// Get the underlying connection pool
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.0
    }

    /// Get the feed repository
    #[must_use]
    pub const fn feeds(&self) -> FeedRepo<'_> {
        FeedRepo::new(&self.0)
    }

    /// Get the download repository
    #[must_use]
    pub const fn downloads(&self) -> DownloadRepo<'_> {
        DownloadRepo::new(&self.0)
    }

    /// Get the app-state repository
    #[must_use]
    pub const fn app_state(&self) -> AppStateRepo<'_> {
        AppStateRepo::new(&self.0)
    }

    /// Close the pool and all its connections.
    pub async fn close(&self) {
        self.0.close().await;
    }
}
