//! Feed repository

use chrono::Utc;
use sqlx::SqlitePool;

use anypod_core::Feed;

use crate::DbError;

/// Partial metadata update for a feed; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct FeedMetadataUpdate {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub author: Option<String>,
    pub author_email: Option<String>,
    pub remote_image_url: Option<String>,
    pub image_ext: Option<String>,
}

impl FeedMetadataUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.subtitle.is_none()
            && self.description.is_none()
            && self.language.is_none()
            && self.author.is_none()
            && self.author_email.is_none()
            && self.remote_image_url.is_none()
            && self.image_ext.is_none()
    }
}

pub struct FeedRepo<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FeedRepo<'a> {
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or update a feed row.
    ///
    /// `created_at`, `updated_at`, and `total_downloads` are left to the
    /// database; everything else is written from the struct.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the upsert fails
    pub async fn upsert_feed(&self, feed: &Feed) -> Result<(), DbError> {
        sqlx::query(
            r"
            INSERT INTO feeds (id, is_enabled, source_type, source_url, resolved_url,
                               last_successful_sync, last_rss_generation,
                               last_failed_sync, consecutive_failures, last_error,
                               since, keep_last, title, subtitle, description,
                               language, author, author_email, remote_image_url,
                               image_ext, category, podcast_type, explicit)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                    ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)
            ON CONFLICT (id) DO UPDATE SET
                is_enabled = excluded.is_enabled,
                source_type = excluded.source_type,
                source_url = excluded.source_url,
                resolved_url = excluded.resolved_url,
                last_successful_sync = excluded.last_successful_sync,
                last_rss_generation = excluded.last_rss_generation,
                last_failed_sync = excluded.last_failed_sync,
                consecutive_failures = excluded.consecutive_failures,
                last_error = excluded.last_error,
                since = excluded.since,
                keep_last = excluded.keep_last,
                title = excluded.title,
                subtitle = excluded.subtitle,
                description = excluded.description,
                language = excluded.language,
                author = excluded.author,
                author_email = excluded.author_email,
                remote_image_url = excluded.remote_image_url,
                image_ext = excluded.image_ext,
                category = excluded.category,
                podcast_type = excluded.podcast_type,
                explicit = excluded.explicit
            ",
        )
        .bind(&feed.id)
        .bind(feed.is_enabled)
        .bind(feed.source_type)
        .bind(&feed.source_url)
        .bind(&feed.resolved_url)
        .bind(feed.last_successful_sync)
        .bind(feed.last_rss_generation)
        .bind(feed.last_failed_sync)
        .bind(feed.consecutive_failures)
        .bind(&feed.last_error)
        .bind(feed.since)
        .bind(feed.keep_last)
        .bind(&feed.title)
        .bind(&feed.subtitle)
        .bind(&feed.description)
        .bind(&feed.language)
        .bind(&feed.author)
        .bind(&feed.author_email)
        .bind(&feed.remote_image_url)
        .bind(&feed.image_ext)
        .bind(feed.category.to_string())
        .bind(feed.podcast_type)
        .bind(feed.explicit)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Fetch a feed by id.
    ///
    /// # Errors
    ///
    /// Returns `DbError::FeedNotFound` when absent
    pub async fn get_feed_by_id(&self, feed_id: &str) -> Result<Feed, DbError> {
        sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE id = ?1")
            .bind(feed_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::FeedNotFound {
                feed_id: feed_id.to_string(),
            })
    }

    /// Fetch all feeds, optionally filtered by enabled state, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails
    pub async fn get_feeds(&self, enabled: Option<bool>) -> Result<Vec<Feed>, DbError> {
        let feeds = match enabled {
            None => {
                sqlx::query_as::<_, Feed>("SELECT * FROM feeds ORDER BY id ASC")
                    .fetch_all(self.pool)
                    .await?
            }
            Some(enabled) => {
                sqlx::query_as::<_, Feed>(
                    "SELECT * FROM feeds WHERE is_enabled = ?1 ORDER BY id ASC",
                )
                .bind(enabled)
                .fetch_all(self.pool)
                .await?
            }
        };
        Ok(feeds)
    }

    /// Advance the sync watermark and clear the failure ledger.
    ///
    /// # Errors
    ///
    /// Returns `DbError::FeedNotFound` when absent
    pub async fn mark_sync_success(&self, feed_id: &str) -> Result<(), DbError> {
        let result = sqlx::query(
            r"
            UPDATE feeds
            SET last_successful_sync = ?2, consecutive_failures = 0, last_error = NULL
            WHERE id = ?1
            ",
        )
        .bind(feed_id)
        .bind(Utc::now())
        .execute(self.pool)
        .await?;
        Self::expect_feed_row(result.rows_affected(), feed_id)
    }

    /// Record a sync failure: bump the consecutive counter and store the error.
    ///
    /// # Errors
    ///
    /// Returns `DbError::FeedNotFound` when absent
    pub async fn mark_sync_failure(
        &self,
        feed_id: &str,
        error_message: &str,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            r"
            UPDATE feeds
            SET last_failed_sync = ?2,
                consecutive_failures = consecutive_failures + 1,
                last_error = ?3
            WHERE id = ?1
            ",
        )
        .bind(feed_id)
        .bind(Utc::now())
        .bind(error_message)
        .execute(self.pool)
        .await?;
        Self::expect_feed_row(result.rows_affected(), feed_id)
    }

    /// Record a successful RSS generation.
    ///
    /// # Errors
    ///
    /// Returns `DbError::FeedNotFound` when absent
    pub async fn mark_rss_generated(&self, feed_id: &str) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE feeds SET last_rss_generation = ?2 WHERE id = ?1")
            .bind(feed_id)
            .bind(Utc::now())
            .execute(self.pool)
            .await?;
        Self::expect_feed_row(result.rows_affected(), feed_id)
    }

    /// Set the enabled flag.
    ///
    /// # Errors
    ///
    /// Returns `DbError::FeedNotFound` when absent
    pub async fn set_feed_enabled(&self, feed_id: &str, enabled: bool) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE feeds SET is_enabled = ?2 WHERE id = ?1")
            .bind(feed_id)
            .bind(enabled)
            .execute(self.pool)
            .await?;
        Self::expect_feed_row(result.rows_affected(), feed_id)
    }

    /// Record the discovery outcome: resolved URL and classified source type.
    ///
    /// # Errors
    ///
    /// Returns `DbError::FeedNotFound` when absent
    pub async fn set_resolved_source(
        &self,
        feed_id: &str,
        source_type: anypod_core::SourceType,
        resolved_url: Option<&str>,
    ) -> Result<(), DbError> {
        let result =
            sqlx::query("UPDATE feeds SET source_type = ?2, resolved_url = ?3 WHERE id = ?1")
                .bind(feed_id)
                .bind(source_type)
                .bind(resolved_url)
                .execute(self.pool)
                .await?;
        Self::expect_feed_row(result.rows_affected(), feed_id)
    }

    /// Update metadata fields; no-op when every field is `None`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::FeedNotFound` when absent
    pub async fn update_feed_metadata(
        &self,
        feed_id: &str,
        update: &FeedMetadataUpdate,
    ) -> Result<(), DbError> {
        if update.is_empty() {
            tracing::debug!(feed_id, "no metadata fields provided for update, skipping");
            return Ok(());
        }

        let result = sqlx::query(
            r"
            UPDATE feeds
            SET title = COALESCE(?2, title),
                subtitle = COALESCE(?3, subtitle),
                description = COALESCE(?4, description),
                language = COALESCE(?5, language),
                author = COALESCE(?6, author),
                author_email = COALESCE(?7, author_email),
                remote_image_url = COALESCE(?8, remote_image_url),
                image_ext = COALESCE(?9, image_ext)
            WHERE id = ?1
            ",
        )
        .bind(feed_id)
        .bind(&update.title)
        .bind(&update.subtitle)
        .bind(&update.description)
        .bind(&update.language)
        .bind(&update.author)
        .bind(&update.author_email)
        .bind(&update.remote_image_url)
        .bind(&update.image_ext)
        .execute(self.pool)
        .await?;
        Self::expect_feed_row(result.rows_affected(), feed_id)
    }

    fn expect_feed_row(rows: u64, feed_id: &str) -> Result<(), DbError> {
        match rows {
            0 => Err(DbError::FeedNotFound {
                feed_id: feed_id.to_string(),
            }),
            1 => Ok(()),
            actual => Err(DbError::UnexpectedRowCount {
                expected: 1,
                actual,
                context: format!("feed {feed_id}"),
            }),
        }
    }
}
