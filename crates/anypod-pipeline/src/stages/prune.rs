//! Prune phase: archive items outside the retention window

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use anypod_core::{Download, DownloadStatus};
use anypod_db::Database;

use crate::filestore::FileStore;
use crate::PipelineError;

/// Identifies out-of-window items, deletes their files, and archives the
/// records.
pub struct Pruner {
    db: Database,
    filestore: FileStore,
}

impl Pruner {
    #[must_use]
    pub const fn new(db: Database, filestore: FileStore) -> Self {
        Self { db, filestore }
    }

    /// Prune a feed by `keep_last` and/or `prune_before_date`.
    ///
    /// Returns the ids archived and the ids whose media files were deleted.
    ///
    /// # Errors
    /// Returns `PipelineError` when candidate queries fail, a file delete
    /// hits an OS error, or archiving a record fails. A missing file is a
    /// warning, not an error.
    pub async fn prune_feed_downloads(
        &self,
        feed_id: &str,
        keep_last: Option<i64>,
        prune_before_date: Option<DateTime<Utc>>,
    ) -> Result<(Vec<String>, Vec<String>), PipelineError> {
        tracing::info!(feed_id, ?keep_last, ?prune_before_date, "starting prune");

        // union of both rules, deduplicated by id
        let mut candidates: BTreeMap<String, Download> = BTreeMap::new();

        if let Some(keep_last) = keep_last {
            let downloads = self
                .db
                .downloads()
                .get_downloads_to_prune_by_keep_last(feed_id, keep_last)
                .await
                .map_err(|err| PipelineError::database(feed_id, err))?;
            candidates.extend(downloads.into_iter().map(|d| (d.id.clone(), d)));
        }
        if let Some(cutoff) = prune_before_date {
            let downloads = self
                .db
                .downloads()
                .get_downloads_to_prune_by_since(feed_id, cutoff)
                .await
                .map_err(|err| PipelineError::database(feed_id, err))?;
            candidates.extend(downloads.into_iter().map(|d| (d.id.clone(), d)));
        }

        if candidates.is_empty() {
            tracing::info!(feed_id, "no downloads to prune");
            return Ok((Vec::new(), Vec::new()));
        }
        tracing::info!(feed_id, count = candidates.len(), "identified prune candidates");

        let mut archived_ids = Vec::new();
        let mut files_deleted_ids = Vec::new();
        for download in candidates.into_values() {
            if self.archive_one(feed_id, &download).await? {
                files_deleted_ids.push(download.id.clone());
            }
            archived_ids.push(download.id);
        }

        tracing::info!(
            feed_id,
            archived = archived_ids.len(),
            files_deleted = files_deleted_ids.len(),
            "prune completed"
        );
        Ok((archived_ids, files_deleted_ids))
    }

    /// Delete the item's files (when present) and archive the record.
    /// Returns whether a media file was actually deleted.
    async fn archive_one(
        &self,
        feed_id: &str,
        download: &Download,
    ) -> Result<bool, PipelineError> {
        let mut file_deleted = false;

        if download.status == DownloadStatus::Downloaded {
            file_deleted = self
                .filestore
                .delete_media_file(feed_id, &download.id, &download.ext)
                .await?;
            if !file_deleted {
                tracing::warn!(
                    feed_id,
                    download_id = download.id,
                    "media file missing on disk during prune, archiving anyway"
                );
            }
        }

        if let Some(thumbnail_ext) = &download.thumbnail_ext {
            let deleted = self
                .filestore
                .delete_image(feed_id, Some(&download.id), thumbnail_ext)
                .await?;
            if !deleted {
                tracing::warn!(
                    feed_id,
                    download_id = download.id,
                    "thumbnail missing on disk during prune"
                );
            }
        }

        self.db
            .downloads()
            .archive_download(feed_id, &download.id)
            .await
            .map_err(|err| PipelineError::Prune {
                feed_id: feed_id.to_string(),
                download_id: download.id.clone(),
                message: format!("failed to archive download record: {err}"),
            })?;

        Ok(file_deleted)
    }

    /// Archive every non-archived download of a feed and remove its XML.
    ///
    /// Used when a feed disappears from the configuration.
    ///
    /// # Errors
    /// Returns `PipelineError` on query, file, or archive failures
    pub async fn archive_feed(&self, feed_id: &str) -> Result<usize, PipelineError> {
        tracing::info!(feed_id, "archiving entire feed");
        let mut archived = 0;

        for status in [
            DownloadStatus::Upcoming,
            DownloadStatus::Queued,
            DownloadStatus::Downloaded,
            DownloadStatus::Error,
            DownloadStatus::Skipped,
        ] {
            let downloads = self
                .db
                .downloads()
                .get_downloads_by_status(status, Some(feed_id), None, -1, 0)
                .await
                .map_err(|err| PipelineError::database(feed_id, err))?;
            for download in downloads {
                self.archive_one(feed_id, &download).await?;
                archived += 1;
            }
        }

        self.filestore.delete_feed_xml(feed_id).await?;
        self.db
            .feeds()
            .set_feed_enabled(feed_id, false)
            .await
            .map_err(|err| PipelineError::database(feed_id, err))?;

        tracing::info!(feed_id, archived, "feed archived");
        Ok(archived)
    }
}
