//! Download repository
//!
//! All status transitions live here so the lifecycle invariants hold no
//! matter which subsystem asks for a change.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use anypod_core::{Download, DownloadStatus};

use crate::DbError;

/// Result of a `bump_retries` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBumpOutcome {
    pub new_retries: i64,
    pub final_status: DownloadStatus,
    pub did_transition_to_error: bool,
}

pub struct DownloadRepo<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DownloadRepo<'a> {
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a download keyed by `(feed_id, id)`.
    ///
    /// Timestamp columns are left to the database.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the upsert fails
    pub async fn upsert_download(&self, download: &Download) -> Result<(), DbError> {
        sqlx::query(
            r"
            INSERT INTO downloads (feed_id, id, source_url, title, published, ext,
                                   mime_type, filesize, duration, status,
                                   remote_thumbnail_url, thumbnail_ext, description,
                                   quality_info, retries, last_error, download_logs,
                                   playlist_index, transcript_ext, transcript_lang,
                                   transcript_source)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                    ?15, ?16, ?17, ?18, ?19, ?20, ?21)
            ON CONFLICT (feed_id, id) DO UPDATE SET
                source_url = excluded.source_url,
                title = excluded.title,
                published = excluded.published,
                ext = excluded.ext,
                mime_type = excluded.mime_type,
                filesize = excluded.filesize,
                duration = excluded.duration,
                status = excluded.status,
                remote_thumbnail_url = excluded.remote_thumbnail_url,
                thumbnail_ext = excluded.thumbnail_ext,
                description = excluded.description,
                quality_info = excluded.quality_info,
                retries = excluded.retries,
                last_error = excluded.last_error,
                download_logs = excluded.download_logs,
                playlist_index = excluded.playlist_index,
                transcript_ext = excluded.transcript_ext,
                transcript_lang = excluded.transcript_lang,
                transcript_source = excluded.transcript_source
            ",
        )
        .bind(&download.feed_id)
        .bind(&download.id)
        .bind(&download.source_url)
        .bind(&download.title)
        .bind(download.published)
        .bind(&download.ext)
        .bind(&download.mime_type)
        .bind(download.filesize)
        .bind(download.duration)
        .bind(download.status)
        .bind(&download.remote_thumbnail_url)
        .bind(&download.thumbnail_ext)
        .bind(&download.description)
        .bind(&download.quality_info)
        .bind(download.retries)
        .bind(&download.last_error)
        .bind(&download.download_logs)
        .bind(download.playlist_index)
        .bind(&download.transcript_ext)
        .bind(&download.transcript_lang)
        .bind(download.transcript_source)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Fetch a download by composite key.
    ///
    /// # Errors
    ///
    /// Returns `DbError::DownloadNotFound` when absent
    pub async fn get_download_by_id(
        &self,
        feed_id: &str,
        download_id: &str,
    ) -> Result<Download, DbError> {
        self.find_download_by_id(feed_id, download_id)
            .await?
            .ok_or_else(|| DbError::DownloadNotFound {
                feed_id: feed_id.to_string(),
                download_id: download_id.to_string(),
            })
    }

    /// Fetch a download by composite key, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails
    pub async fn find_download_by_id(
        &self,
        feed_id: &str,
        download_id: &str,
    ) -> Result<Option<Download>, DbError> {
        let download = sqlx::query_as::<_, Download>(
            "SELECT * FROM downloads WHERE feed_id = ?1 AND id = ?2",
        )
        .bind(feed_id)
        .bind(download_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(download)
    }

    /// Fetch downloads with a given status, newest published first.
    ///
    /// `limit` of -1 means unbounded; `published_after` filters to
    /// `published >= `.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails
    pub async fn get_downloads_by_status(
        &self,
        status: DownloadStatus,
        feed_id: Option<&str>,
        published_after: Option<DateTime<Utc>>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Download>, DbError> {
        let downloads = sqlx::query_as::<_, Download>(
            r"
            SELECT * FROM downloads
            WHERE status = ?1
              AND (?2 IS NULL OR feed_id = ?2)
              AND (?3 IS NULL OR published >= ?3)
            ORDER BY published DESC
            LIMIT ?4 OFFSET ?5
            ",
        )
        .bind(status)
        .bind(feed_id)
        .bind(published_after)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;
        Ok(downloads)
    }

    /// Count downloads with a given status.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails
    pub async fn count_downloads_by_status(
        &self,
        status: DownloadStatus,
        feed_id: Option<&str>,
    ) -> Result<i64, DbError> {
        let count: (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*) FROM downloads
            WHERE status = ?1 AND (?2 IS NULL OR feed_id = ?2)
            ",
        )
        .bind(status)
        .bind(feed_id)
        .fetch_one(self.pool)
        .await?;
        Ok(count.0)
    }

    /// Fetch QUEUED downloads for a feed, oldest published first.
    ///
    /// `limit` of 0 means unbounded.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails
    pub async fn get_queued_oldest_first(
        &self,
        feed_id: &str,
        limit: i64,
    ) -> Result<Vec<Download>, DbError> {
        let effective_limit = if limit <= 0 { -1 } else { limit };
        let downloads = sqlx::query_as::<_, Download>(
            r"
            SELECT * FROM downloads
            WHERE feed_id = ?1 AND status = ?2
            ORDER BY published ASC
            LIMIT ?3
            ",
        )
        .bind(feed_id)
        .bind(DownloadStatus::Queued)
        .bind(effective_limit)
        .fetch_all(self.pool)
        .await?;
        Ok(downloads)
    }

    /// Transition a download from UPCOMING to QUEUED.
    ///
    /// Preserves `retries` and `last_error`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::DownloadNotFound` when absent, or
    /// `DbError::InvalidTransition` when the current status is not UPCOMING
    pub async fn mark_as_queued_from_upcoming(
        &self,
        feed_id: &str,
        download_id: &str,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            r"
            UPDATE downloads SET status = ?3
            WHERE feed_id = ?1 AND id = ?2 AND status = ?4
            ",
        )
        .bind(feed_id)
        .bind(download_id)
        .bind(DownloadStatus::Queued)
        .bind(DownloadStatus::Upcoming)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        let current = self.get_download_by_id(feed_id, download_id).await?;
        Err(DbError::InvalidTransition {
            feed_id: feed_id.to_string(),
            download_id: download_id.to_string(),
            detail: format!("status is not UPCOMING (is {})", current.status),
        })
    }

    /// Mark a download DOWNLOADED with its final media descriptors.
    ///
    /// Only valid from QUEUED. Resets the retry ledger; the trigger sets
    /// `downloaded_at` and bumps the feed counter.
    ///
    /// # Errors
    ///
    /// Returns `DbError::DownloadNotFound` when absent, or
    /// `DbError::InvalidTransition` when the current status is not QUEUED
    pub async fn mark_as_downloaded(
        &self,
        feed_id: &str,
        download_id: &str,
        ext: &str,
        filesize: i64,
        duration: Option<i64>,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            r"
            UPDATE downloads
            SET status = ?3, retries = 0, last_error = NULL,
                ext = ?4, filesize = ?5, duration = COALESCE(?6, duration)
            WHERE feed_id = ?1 AND id = ?2 AND status = ?7
            ",
        )
        .bind(feed_id)
        .bind(download_id)
        .bind(DownloadStatus::Downloaded)
        .bind(ext)
        .bind(filesize)
        .bind(duration)
        .bind(DownloadStatus::Queued)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        let current = self.get_download_by_id(feed_id, download_id).await?;
        Err(DbError::InvalidTransition {
            feed_id: feed_id.to_string(),
            download_id: download_id.to_string(),
            detail: format!(
                "status is not QUEUED (is {}), cannot mark as DOWNLOADED",
                current.status
            ),
        })
    }

    /// Mark a download SKIPPED, preserving `retries` and `last_error`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::DownloadNotFound` when absent
    pub async fn skip_download(&self, feed_id: &str, download_id: &str) -> Result<(), DbError> {
        let result =
            sqlx::query("UPDATE downloads SET status = ?3 WHERE feed_id = ?1 AND id = ?2")
                .bind(feed_id)
                .bind(download_id)
                .bind(DownloadStatus::Skipped)
                .execute(self.pool)
                .await?;
        Self::expect_download_row(result.rows_affected(), feed_id, download_id)
    }

    /// Mark a download ARCHIVED and clear its hosted thumbnail extension.
    ///
    /// Idempotent: archiving an already-ARCHIVED row is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `DbError::DownloadNotFound` when absent
    pub async fn archive_download(
        &self,
        feed_id: &str,
        download_id: &str,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            r"
            UPDATE downloads SET status = ?3, thumbnail_ext = NULL
            WHERE feed_id = ?1 AND id = ?2 AND status != ?3
            ",
        )
        .bind(feed_id)
        .bind(download_id)
        .bind(DownloadStatus::Archived)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        // Distinguish "missing" from "already archived"
        self.get_download_by_id(feed_id, download_id).await?;
        Ok(())
    }

    /// Delete a download row outright (manual feeds only), returning the
    /// deleted record so the caller can clean up files.
    ///
    /// # Errors
    ///
    /// Returns `DbError::DownloadNotFound` when absent
    pub async fn delete_download(
        &self,
        feed_id: &str,
        download_id: &str,
    ) -> Result<Download, DbError> {
        let download = self.get_download_by_id(feed_id, download_id).await?;
        sqlx::query("DELETE FROM downloads WHERE feed_id = ?1 AND id = ?2")
            .bind(feed_id)
            .bind(download_id)
            .execute(self.pool)
            .await?;
        Ok(download)
    }

    /// Increment the retry count and transition to ERROR when the budget is
    /// exhausted. A DOWNLOADED item never regresses into ERROR.
    ///
    /// Runs as a single transaction.
    ///
    /// # Errors
    ///
    /// Returns `DbError::DownloadNotFound` when absent
    pub async fn bump_retries(
        &self,
        feed_id: &str,
        download_id: &str,
        error_message: &str,
        max_allowed_errors: i64,
    ) -> Result<RetryBumpOutcome, DbError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Download>(
            "SELECT * FROM downloads WHERE feed_id = ?1 AND id = ?2",
        )
        .bind(feed_id)
        .bind(download_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::DownloadNotFound {
            feed_id: feed_id.to_string(),
            download_id: download_id.to_string(),
        })?;

        let new_retries = current.retries + 1;
        let should_transition = new_retries >= max_allowed_errors
            && current.status != DownloadStatus::Downloaded;
        let final_status = if should_transition {
            DownloadStatus::Error
        } else {
            current.status
        };
        let did_transition_to_error =
            final_status == DownloadStatus::Error && current.status != DownloadStatus::Error;

        if did_transition_to_error {
            tracing::info!(
                feed_id,
                download_id,
                retries = new_retries,
                max_allowed_errors,
                "download transitioning to ERROR after retry budget exhausted"
            );
        } else if new_retries >= max_allowed_errors
            && current.status == DownloadStatus::Downloaded
        {
            tracing::warn!(
                feed_id,
                download_id,
                retries = new_retries,
                "max retries reached for already DOWNLOADED item, status unchanged"
            );
        }

        sqlx::query(
            r"
            UPDATE downloads SET retries = ?3, status = ?4, last_error = ?5
            WHERE feed_id = ?1 AND id = ?2
            ",
        )
        .bind(feed_id)
        .bind(download_id)
        .bind(new_retries)
        .bind(final_status)
        .bind(error_message)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(RetryBumpOutcome {
            new_retries,
            final_status,
            did_transition_to_error,
        })
    }

    /// Re-queue downloads, resetting `retries` to 0 and clearing
    /// `last_error`.
    ///
    /// With `ids = None`, `from_status` must be set and all matching rows
    /// are updated (safe no-op when none match). With explicit ids, each row
    /// is updated; a missing id is an error unless `from_status` is set, in
    /// which case a non-matching current status is the error instead.
    ///
    /// # Errors
    ///
    /// Returns `DbError::DownloadNotFound` / `DbError::InvalidTransition` per
    /// the rules above
    pub async fn requeue_downloads(
        &self,
        feed_id: &str,
        ids: Option<&[String]>,
        from_status: Option<DownloadStatus>,
    ) -> Result<u64, DbError> {
        match ids {
            None => {
                let from_status = from_status.ok_or_else(|| DbError::InvalidTransition {
                    feed_id: feed_id.to_string(),
                    download_id: "<bulk>".to_string(),
                    detail: "bulk requeue requires from_status".to_string(),
                })?;
                let result = sqlx::query(
                    r"
                    UPDATE downloads
                    SET status = ?3, retries = 0, last_error = NULL
                    WHERE feed_id = ?1 AND status = ?2
                    ",
                )
                .bind(feed_id)
                .bind(from_status)
                .bind(DownloadStatus::Queued)
                .execute(self.pool)
                .await?;
                Ok(result.rows_affected())
            }
            Some(ids) => {
                let mut count = 0u64;
                for id in ids {
                    count += self.requeue_one(feed_id, id, from_status).await?;
                }
                Ok(count)
            }
        }
    }

    async fn requeue_one(
        &self,
        feed_id: &str,
        download_id: &str,
        from_status: Option<DownloadStatus>,
    ) -> Result<u64, DbError> {
        let result = sqlx::query(
            r"
            UPDATE downloads
            SET status = ?3, retries = 0, last_error = NULL
            WHERE feed_id = ?1 AND id = ?2 AND (?4 IS NULL OR status = ?4)
            ",
        )
        .bind(feed_id)
        .bind(download_id)
        .bind(DownloadStatus::Queued)
        .bind(from_status)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(1);
        }
        match from_status {
            None => Err(DbError::DownloadNotFound {
                feed_id: feed_id.to_string(),
                download_id: download_id.to_string(),
            }),
            Some(expected) => {
                let current = self.get_download_by_id(feed_id, download_id).await?;
                Err(DbError::InvalidTransition {
                    feed_id: feed_id.to_string(),
                    download_id: download_id.to_string(),
                    detail: format!(
                        "status is not {expected} (is {}), cannot re-queue",
                        current.status
                    ),
                })
            }
        }
    }

    /// Rows exceeding the `keep_last` newest, excluding ARCHIVED and SKIPPED.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails
    pub async fn get_downloads_to_prune_by_keep_last(
        &self,
        feed_id: &str,
        keep_last: i64,
    ) -> Result<Vec<Download>, DbError> {
        if keep_last <= 0 {
            return Ok(Vec::new());
        }
        let downloads = sqlx::query_as::<_, Download>(
            r"
            SELECT * FROM downloads
            WHERE feed_id = ?1 AND status NOT IN (?2, ?3)
            ORDER BY published DESC
            LIMIT -1 OFFSET ?4
            ",
        )
        .bind(feed_id)
        .bind(DownloadStatus::Archived)
        .bind(DownloadStatus::Skipped)
        .bind(keep_last)
        .fetch_all(self.pool)
        .await?;
        Ok(downloads)
    }

    /// Rows published before `since`, excluding ARCHIVED and SKIPPED.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails
    pub async fn get_downloads_to_prune_by_since(
        &self,
        feed_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Download>, DbError> {
        let downloads = sqlx::query_as::<_, Download>(
            r"
            SELECT * FROM downloads
            WHERE feed_id = ?1 AND published < ?2 AND status NOT IN (?3, ?4)
            ORDER BY published ASC
            ",
        )
        .bind(feed_id)
        .bind(since)
        .bind(DownloadStatus::Archived)
        .bind(DownloadStatus::Skipped)
        .fetch_all(self.pool)
        .await?;
        Ok(downloads)
    }

    /// Record the hosted thumbnail extension after a thumbnail download.
    ///
    /// # Errors
    ///
    /// Returns `DbError::DownloadNotFound` when absent
    pub async fn set_thumbnail_ext(
        &self,
        feed_id: &str,
        download_id: &str,
        thumbnail_ext: Option<&str>,
    ) -> Result<(), DbError> {
        let result =
            sqlx::query("UPDATE downloads SET thumbnail_ext = ?3 WHERE feed_id = ?1 AND id = ?2")
                .bind(feed_id)
                .bind(download_id)
                .bind(thumbnail_ext)
                .execute(self.pool)
                .await?;
        Self::expect_download_row(result.rows_affected(), feed_id, download_id)
    }

    /// Persist the captured fetcher logs for the most recent attempt.
    ///
    /// # Errors
    ///
    /// Returns `DbError::DownloadNotFound` when absent
    pub async fn set_download_logs(
        &self,
        feed_id: &str,
        download_id: &str,
        logs: &str,
    ) -> Result<(), DbError> {
        let result =
            sqlx::query("UPDATE downloads SET download_logs = ?3 WHERE feed_id = ?1 AND id = ?2")
                .bind(feed_id)
                .bind(download_id)
                .bind(logs)
                .execute(self.pool)
                .await?;
        Self::expect_download_row(result.rows_affected(), feed_id, download_id)
    }

    /// Record transcript descriptors after a transcript download.
    ///
    /// # Errors
    ///
    /// Returns `DbError::DownloadNotFound` when absent
    pub async fn set_transcript(
        &self,
        feed_id: &str,
        download_id: &str,
        transcript_ext: &str,
        transcript_lang: &str,
        transcript_source: anypod_core::TranscriptSource,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            r"
            UPDATE downloads
            SET transcript_ext = ?3, transcript_lang = ?4, transcript_source = ?5
            WHERE feed_id = ?1 AND id = ?2
            ",
        )
        .bind(feed_id)
        .bind(download_id)
        .bind(transcript_ext)
        .bind(transcript_lang)
        .bind(transcript_source)
        .execute(self.pool)
        .await?;
        Self::expect_download_row(result.rows_affected(), feed_id, download_id)
    }

    fn expect_download_row(rows: u64, feed_id: &str, download_id: &str) -> Result<(), DbError> {
        match rows {
            0 => Err(DbError::DownloadNotFound {
                feed_id: feed_id.to_string(),
                download_id: download_id.to_string(),
            }),
            1 => Ok(()),
            actual => Err(DbError::UnexpectedRowCount {
                expected: 1,
                actual,
                context: format!("download {feed_id}/{download_id}"),
            }),
        }
    }
}
