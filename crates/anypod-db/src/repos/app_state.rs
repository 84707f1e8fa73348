//! Application-state repository

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use anypod_core::APP_STATE_ID;

use crate::DbError;

pub struct AppStateRepo<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AppStateRepo<'a> {
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Return the timestamp of the last yt-dlp self-update, if any.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails
    pub async fn get_last_yt_dlp_update(&self) -> Result<Option<DateTime<Utc>>, DbError> {
        let row: Option<(Option<DateTime<Utc>>,)> =
            sqlx::query_as("SELECT last_yt_dlp_update FROM app_state WHERE id = ?1")
                .bind(APP_STATE_ID)
                .fetch_optional(self.pool)
                .await?;
        Ok(row.and_then(|(ts,)| ts))
    }

    /// Set the last yt-dlp update timestamp to now or the provided time.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the upsert fails
    pub async fn upsert_last_yt_dlp_update(
        &self,
        when: Option<DateTime<Utc>>,
    ) -> Result<(), DbError> {
        let ts = when.unwrap_or_else(Utc::now);
        sqlx::query(
            r"
            INSERT INTO app_state (id, last_yt_dlp_update) VALUES (?1, ?2)
            ON CONFLICT (id) DO UPDATE SET last_yt_dlp_update = excluded.last_yt_dlp_update
            ",
        )
        .bind(APP_STATE_ID)
        .bind(ts)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Advance the yt-dlp update watermark iff `min_interval` has passed.
    ///
    /// The conditional update runs as a single statement; the return value
    /// reports whether this caller won the update.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the update fails
    pub async fn update_yt_dlp_timestamp_if_stale(
        &self,
        min_interval: Duration,
    ) -> Result<bool, DbError> {
        let now = Utc::now();
        let cutoff = now - min_interval;
        let result = sqlx::query(
            r"
            UPDATE app_state SET last_yt_dlp_update = ?2
            WHERE id = ?1
              AND (last_yt_dlp_update IS NULL OR last_yt_dlp_update <= ?3)
            ",
        )
        .bind(APP_STATE_ID)
        .bind(now)
        .bind(cutoff)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
