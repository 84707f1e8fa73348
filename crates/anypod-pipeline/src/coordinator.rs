//! Orchestration of one feed's processing pipeline
//!
//! Enqueue, download, prune, RSS — strictly in that order, with per-phase
//! outcomes rolled into a `ProcessingResults`.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};

use anypod_core::{DownloadStatus, PhaseResult, ProcessingResults};
use anypod_db::{Database, FeedMetadataUpdate};
use anypod_fetch::Fetcher;

use crate::config::FeedConfig;
use crate::context::new_context_id;
use crate::image::ImageDownloader;
use crate::paths::PathManager;
use crate::rss::RssGenerator;
use crate::stages::{Downloader, Enqueuer, Pruner};

use tracing::Instrument;

/// Minimum interval between fetcher self-updates.
const YT_DLP_UPDATE_INTERVAL_HOURS: i64 = 24;

/// Composes the four phases for one feed into a single `process` call.
pub struct FeedCoordinator {
    db: Database,
    fetcher: Arc<Fetcher>,
    paths: PathManager,
    images: Arc<ImageDownloader>,
    enqueuer: Enqueuer,
    downloader: Downloader,
    pruner: Pruner,
    rss: RssGenerator,
}

impl FeedCoordinator {
    #[must_use]
    #[expect(clippy::too_many_arguments)]
    pub const fn new(
        db: Database,
        fetcher: Arc<Fetcher>,
        paths: PathManager,
        images: Arc<ImageDownloader>,
        enqueuer: Enqueuer,
        downloader: Downloader,
        pruner: Pruner,
        rss: RssGenerator,
    ) -> Self {
        Self {
            db,
            fetcher,
            paths,
            images,
            enqueuer,
            downloader,
            pruner,
            rss,
        }
    }

    /// Run the full pipeline for one feed.
    ///
    /// Every log line of the run carries the same `context_id` span field.
    pub async fn process(&self, feed_id: &str, feed_config: &FeedConfig) -> ProcessingResults {
        let context_id = new_context_id(feed_id);
        let span = tracing::info_span!("process_feed", feed_id, context_id);
        self.process_inner(feed_id, feed_config).instrument(span).await
    }

    async fn process_inner(
        &self,
        feed_id: &str,
        feed_config: &FeedConfig,
    ) -> ProcessingResults {
        let start = Instant::now();
        let mut results = ProcessingResults::new(feed_id.to_string(), Utc::now());

        self.maybe_update_fetcher().await;

        let downloaded_before = self.downloaded_count(feed_id).await;

        // --- enqueue (fatal on failure) ---
        let phase_start = Instant::now();
        let watermark = match self.db.feeds().get_feed_by_id(feed_id).await {
            Ok(feed) => feed.last_successful_sync,
            Err(err) => {
                results.fatal_error = Some(err.to_string());
                results.enqueue_result = phase_failure(phase_start, err.to_string());
                results.total_duration_seconds = start.elapsed().as_secs_f64();
                return results;
            }
        };

        match self
            .enqueuer
            .enqueue_new_downloads(feed_id, feed_config, watermark)
            .await
        {
            Ok(count) => {
                results.enqueue_result = phase_ok(phase_start, count);
            }
            Err(err) => {
                tracing::error!(feed_id, %err, "enqueue phase failed, aborting pipeline");
                let message = err.to_string();
                if let Err(mark_err) = self.db.feeds().mark_sync_failure(feed_id, &message).await
                {
                    tracing::error!(feed_id, %mark_err, "failed to record sync failure");
                }
                results.enqueue_result = phase_failure(phase_start, message.clone());
                results.fatal_error = Some(message);
                results.total_duration_seconds = start.elapsed().as_secs_f64();
                return results;
            }
        }

        // --- download (per-item failures only) ---
        let phase_start = Instant::now();
        match self
            .downloader
            .download_queued(feed_id, feed_config, 0)
            .await
        {
            Ok((success_count, failure_count)) => {
                let mut result = phase_ok(phase_start, success_count);
                if failure_count > 0 {
                    result
                        .errors
                        .push(format!("{failure_count} download(s) failed"));
                }
                results.download_result = result;
            }
            Err(err) => {
                tracing::error!(feed_id, %err, "download phase failed");
                results.download_result = phase_failure(phase_start, err.to_string());
            }
        }

        // --- prune (only when a retention policy is set) ---
        let phase_start = Instant::now();
        if feed_config.keep_last.is_some() || feed_config.since.is_some() {
            match self
                .pruner
                .prune_feed_downloads(feed_id, feed_config.keep_last, feed_config.since)
                .await
            {
                Ok((archived, _files_deleted)) => {
                    results.prune_result = phase_ok(phase_start, archived.len());
                }
                Err(err) => {
                    tracing::error!(feed_id, %err, "prune phase failed");
                    results.prune_result = phase_failure(phase_start, err.to_string());
                }
            }
        } else {
            tracing::debug!(feed_id, "skipping prune phase, no retention policy");
            results.prune_result = phase_ok(phase_start, 0);
        }

        self.ensure_feed_image(feed_id, feed_config).await;

        // --- rss (when the downloaded set changed or no XML exists) ---
        let phase_start = Instant::now();
        let downloaded_after = self.downloaded_count(feed_id).await;
        let needs_rss =
            downloaded_before != downloaded_after || !self.feed_xml_exists(feed_id).await;
        if needs_rss {
            match self.rss.generate_feed(feed_id).await {
                Ok(count) => {
                    results.rss_result = phase_ok(phase_start, count);
                }
                Err(err) => {
                    tracing::error!(feed_id, %err, "rss phase failed");
                    results.rss_result = phase_failure(phase_start, err.to_string());
                }
            }
        } else {
            tracing::debug!(feed_id, "skipping rss phase, downloaded set unchanged");
            results.rss_result = phase_ok(phase_start, 0);
        }

        // success requires no fatal error in the enqueue or rss phases
        results.overall_success =
            results.enqueue_result.success && results.rss_result.success;
        if results.overall_success {
            match self.db.feeds().mark_sync_success(feed_id).await {
                Ok(()) => results.feed_sync_updated = true,
                Err(err) => {
                    tracing::error!(feed_id, %err, "failed to mark sync success");
                    results.overall_success = false;
                }
            }
        }

        results.total_duration_seconds = start.elapsed().as_secs_f64();
        tracing::info!(
            feed_id,
            overall_success = results.overall_success,
            enqueued = results.total_enqueued(),
            downloaded = results.total_downloaded(),
            archived = results.total_archived(),
            errors = results.error_count(),
            duration_seconds = results.total_duration_seconds,
            "feed processing finished"
        );
        results
    }

    /// Run only the RSS phase (used after a manual delete).
    pub async fn regenerate_rss(&self, feed_id: &str) -> ProcessingResults {
        let context_id = new_context_id(feed_id);
        let span = tracing::info_span!("regenerate_rss", feed_id, context_id);
        self.regenerate_rss_inner(feed_id).instrument(span).await
    }

    async fn regenerate_rss_inner(&self, feed_id: &str) -> ProcessingResults {
        let start = Instant::now();
        let mut results = ProcessingResults::new(feed_id.to_string(), Utc::now());
        results.enqueue_result = PhaseResult::ok(0);
        results.download_result = PhaseResult::ok(0);
        results.prune_result = PhaseResult::ok(0);

        let phase_start = Instant::now();
        match self.rss.generate_feed(feed_id).await {
            Ok(count) => {
                results.rss_result = phase_ok(phase_start, count);
                results.overall_success = true;
            }
            Err(err) => {
                tracing::error!(feed_id, %err, "rss regeneration failed");
                results.rss_result = phase_failure(phase_start, err.to_string());
            }
        }
        results.total_duration_seconds = start.elapsed().as_secs_f64();
        results
    }

    /// Self-update the fetcher at most once per interval, gated through the
    /// app-state watermark so concurrent pipelines don't race.
    async fn maybe_update_fetcher(&self) {
        let interval = Duration::hours(YT_DLP_UPDATE_INTERVAL_HOURS);
        match self
            .db
            .app_state()
            .update_yt_dlp_timestamp_if_stale(interval)
            .await
        {
            Ok(true) => {
                if let Err(err) = self.fetcher.self_update().await {
                    tracing::warn!(%err, "yt-dlp self-update failed, continuing");
                }
            }
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(%err, "could not check yt-dlp update watermark");
            }
        }
    }

    /// Host the feed image once a source for it is known. Failures never
    /// block the pipeline.
    async fn ensure_feed_image(&self, feed_id: &str, feed_config: &FeedConfig) {
        let feed = match self.db.feeds().get_feed_by_id(feed_id).await {
            Ok(feed) => feed,
            Err(err) => {
                tracing::warn!(feed_id, %err, "could not load feed for image hosting");
                return;
            }
        };
        if feed.image_ext.is_some() {
            return;
        }

        let configured = feed_config
            .metadata
            .as_ref()
            .and_then(|meta| meta.image_url.clone());
        let Some(url) = configured.or(feed.remote_image_url) else {
            return;
        };

        match self.images.download_image(feed_id, None, &url).await {
            Ok(ext) => {
                let update = FeedMetadataUpdate {
                    image_ext: Some(ext),
                    ..FeedMetadataUpdate::default()
                };
                if let Err(err) = self.db.feeds().update_feed_metadata(feed_id, &update).await
                {
                    tracing::warn!(feed_id, %err, "failed to record hosted feed image");
                }
            }
            Err(err) => {
                tracing::warn!(feed_id, %err, "feed image download failed, continuing");
            }
        }
    }

    async fn downloaded_count(&self, feed_id: &str) -> i64 {
        self.db
            .downloads()
            .count_downloads_by_status(DownloadStatus::Downloaded, Some(feed_id))
            .await
            .unwrap_or_else(|err| {
                tracing::warn!(feed_id, %err, "could not count downloaded items");
                -1
            })
    }

    async fn feed_xml_exists(&self, feed_id: &str) -> bool {
        let path = self.paths.base_feeds_dir().join(format!("{feed_id}.xml"));
        tokio::fs::metadata(path).await.is_ok()
    }
}

fn phase_ok(start: Instant, count: usize) -> PhaseResult {
    PhaseResult {
        success: true,
        count,
        errors: Vec::new(),
        duration_seconds: start.elapsed().as_secs_f64(),
    }
}

fn phase_failure(start: Instant, error: String) -> PhaseResult {
    PhaseResult {
        success: false,
        count: 0,
        errors: vec![error],
        duration_seconds: start.elapsed().as_secs_f64(),
    }
}
