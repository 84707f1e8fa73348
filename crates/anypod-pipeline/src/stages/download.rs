//! Download phase: drain QUEUED items into DOWNLOADED

use std::sync::Arc;

use anypod_core::Download;
use anypod_db::Database;
use anypod_fetch::{Fetcher, FfProbe};

use crate::config::FeedConfig;
use crate::filestore::FileStore;
use crate::image::ImageDownloader;
use crate::paths::PathManager;
use crate::PipelineError;

/// Keep only the tail of captured fetcher output on the download row.
const MAX_LOG_CHARS: usize = 4096;

/// Downloads media and thumbnails for QUEUED items, oldest published first.
pub struct Downloader {
    db: Database,
    fetcher: Arc<Fetcher>,
    paths: PathManager,
    filestore: FileStore,
    images: Arc<ImageDownloader>,
    ffprobe: FfProbe,
}

impl Downloader {
    #[must_use]
    pub const fn new(
        db: Database,
        fetcher: Arc<Fetcher>,
        paths: PathManager,
        filestore: FileStore,
        images: Arc<ImageDownloader>,
        ffprobe: FfProbe,
    ) -> Self {
        Self {
            db,
            fetcher,
            paths,
            filestore,
            images,
            ffprobe,
        }
    }

    /// Process QUEUED items for a feed, up to `limit` (0 = unbounded).
    ///
    /// Per-item failures bump the retry budget and processing continues;
    /// only fetching the queue itself is fatal.
    ///
    /// Returns `(success_count, failure_count)`.
    ///
    /// # Errors
    /// Returns `PipelineError::Database` when the queue query fails
    pub async fn download_queued(
        &self,
        feed_id: &str,
        feed_config: &FeedConfig,
        limit: i64,
    ) -> Result<(usize, usize), PipelineError> {
        let queued = self
            .db
            .downloads()
            .get_queued_oldest_first(feed_id, limit)
            .await
            .map_err(|err| PipelineError::database(feed_id, err))?;

        if queued.is_empty() {
            tracing::debug!(feed_id, "no queued downloads");
            return Ok((0, 0));
        }
        tracing::info!(feed_id, count = queued.len(), "downloading queued items");

        let mut success_count = 0;
        let mut failure_count = 0;
        for download in queued {
            match self.download_one(feed_id, feed_config, &download).await {
                Ok(()) => success_count += 1,
                Err(err) => {
                    failure_count += 1;
                    self.record_failure(feed_id, &download, feed_config, &err).await;
                }
            }
        }

        tracing::info!(feed_id, success_count, failure_count, "download phase finished");
        Ok((success_count, failure_count))
    }

    async fn download_one(
        &self,
        feed_id: &str,
        feed_config: &FeedConfig,
        download: &Download,
    ) -> Result<(), PipelineError> {
        let tmp_dir = self.paths.feed_tmp_dir(feed_id).await?;
        let yt_cli_args = feed_config.yt_cli_args()?;

        let media = self
            .fetcher
            .download_media(download, &yt_cli_args, &tmp_dir)
            .await;

        let media = match media {
            Ok(media) => media,
            Err(err) => {
                self.cleanup_tmp(&tmp_dir, &download.id).await;
                return Err(err.into());
            }
        };

        // metadata-time duration can be a sentinel; probe the real file then
        let duration = if download.duration <= 1 {
            match self.ffprobe.duration_from_file(&media.path).await {
                Ok(probed) => Some(probed),
                Err(err) => {
                    tracing::warn!(
                        feed_id,
                        download_id = download.id,
                        %err,
                        "duration probe failed, keeping metadata value"
                    );
                    None
                }
            }
        } else {
            None
        };

        let persisted = self
            .filestore
            .persist_media_file(feed_id, &download.id, &media.ext, &media.path)
            .await;
        if let Err(err) = persisted {
            self.cleanup_tmp(&tmp_dir, &download.id).await;
            return Err(err);
        }

        if let Err(err) = self
            .db
            .downloads()
            .set_download_logs(feed_id, &download.id, tail(&media.logs))
            .await
        {
            tracing::warn!(feed_id, download_id = download.id, %err, "failed to persist fetcher logs");
        }

        self.fetch_thumbnail(feed_id, download).await;
        self.fetch_transcript(feed_id, feed_config, download).await;

        self.db
            .downloads()
            .mark_as_downloaded(feed_id, &download.id, &media.ext, media.filesize, duration)
            .await
            .map_err(|err| PipelineError::database(feed_id, err))?;

        tracing::info!(
            feed_id,
            download_id = download.id,
            ext = media.ext,
            filesize = media.filesize,
            "download complete"
        );
        Ok(())
    }

    /// Thumbnail failures are logged and never retried; the item proceeds.
    async fn fetch_thumbnail(&self, feed_id: &str, download: &Download) {
        let Some(url) = &download.remote_thumbnail_url else {
            return;
        };
        match self
            .images
            .download_image(feed_id, Some(&download.id), url)
            .await
        {
            Ok(ext) => {
                if let Err(err) = self
                    .db
                    .downloads()
                    .set_thumbnail_ext(feed_id, &download.id, Some(&ext))
                    .await
                {
                    tracing::warn!(feed_id, download_id = download.id, %err, "failed to record thumbnail extension");
                }
            }
            Err(err) => {
                tracing::warn!(
                    feed_id,
                    download_id = download.id,
                    %err,
                    "thumbnail download failed, continuing without"
                );
            }
        }
    }

    /// Transcript failures are logged; the item proceeds without one.
    async fn fetch_transcript(
        &self,
        feed_id: &str,
        feed_config: &FeedConfig,
        download: &Download,
    ) {
        let Some(lang) = &feed_config.transcript_lang else {
            return;
        };
        let Ok(media_dir) = self.paths.feed_media_dir(feed_id).await else {
            return;
        };
        match self
            .fetcher
            .download_transcript(download, lang, &feed_config.transcript_priority(), &media_dir)
            .await
        {
            Ok(Some((ext, source))) => {
                if let Err(err) = self
                    .db
                    .downloads()
                    .set_transcript(feed_id, &download.id, &ext, lang, source)
                    .await
                {
                    tracing::warn!(feed_id, download_id = download.id, %err, "failed to record transcript");
                }
            }
            Ok(None) => {
                tracing::debug!(feed_id, download_id = download.id, "no transcript available");
            }
            Err(err) => {
                tracing::warn!(
                    feed_id,
                    download_id = download.id,
                    %err,
                    "transcript download failed, continuing without"
                );
            }
        }
    }

    async fn record_failure(
        &self,
        feed_id: &str,
        download: &Download,
        feed_config: &FeedConfig,
        error: &PipelineError,
    ) {
        let message = error.to_string();
        tracing::error!(feed_id, download_id = download.id, error = message, "download failed");

        if let PipelineError::Fetch(anypod_fetch::FetchError::YtdlpApi { message, .. }) = error {
            if let Err(err) = self
                .db
                .downloads()
                .set_download_logs(feed_id, &download.id, tail(message))
                .await
            {
                tracing::warn!(feed_id, download_id = download.id, %err, "failed to persist failure logs");
            }
        }

        match self
            .db
            .downloads()
            .bump_retries(feed_id, &download.id, &message, feed_config.max_errors)
            .await
        {
            Ok(outcome) if outcome.did_transition_to_error => {
                tracing::warn!(
                    feed_id,
                    download_id = download.id,
                    retries = outcome.new_retries,
                    "download moved to ERROR after exhausting retries"
                );
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(feed_id, download_id = download.id, %err, "failed to bump retries");
            }
        }
    }

    /// Remove leftover temp artifacts for one item after a failed attempt.
    async fn cleanup_tmp(&self, tmp_dir: &std::path::Path, download_id: &str) {
        let prefix = format!("{download_id}.");
        let Ok(mut entries) = tokio::fs::read_dir(tmp_dir).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            if name.to_str().is_some_and(|name| name.starts_with(&prefix)) {
                if let Err(err) = tokio::fs::remove_file(entry.path()).await {
                    tracing::warn!(path = %entry.path().display(), %err, "failed to remove temp artifact");
                }
            }
        }
    }
}

/// Last chunk of captured output, bounded for storage.
fn tail(logs: &str) -> &str {
    if logs.len() <= MAX_LOG_CHARS {
        return logs;
    }
    let start = logs.len() - MAX_LOG_CHARS;
    // keep the boundary on a char edge
    let mut cut = start;
    while !logs.is_char_boundary(cut) {
        cut += 1;
    }
    &logs[cut..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_bounds_long_logs() {
        let long = "x".repeat(MAX_LOG_CHARS + 100);
        assert_eq!(tail(&long).len(), MAX_LOG_CHARS);
        assert_eq!(tail("short"), "short");
    }
}
