//! Enqueue phase: reconcile UPCOMING items and discover new ones

use std::sync::Arc;

use chrono::{DateTime, Utc};

use anypod_core::{Download, DownloadStatus, SourceType};
use anypod_db::{Database, FeedMetadataUpdate};
use anypod_fetch::Fetcher;
use anypod_util::day_floor;

use crate::config::FeedConfig;
use crate::PipelineError;

/// Discovers new items for a feed and upserts their records with the
/// correct status.
pub struct Enqueuer {
    db: Database,
    fetcher: Arc<Fetcher>,
}

impl Enqueuer {
    #[must_use]
    pub const fn new(db: Database, fetcher: Arc<Fetcher>) -> Self {
        Self { db, fetcher }
    }

    fn enqueue_error(
        feed_id: &str,
        message: &str,
        source: Option<anypod_fetch::FetchError>,
    ) -> PipelineError {
        PipelineError::Enqueue {
            feed_id: feed_id.to_string(),
            message: message.to_string(),
            source,
        }
    }

    /// Run both enqueue phases for a feed.
    ///
    /// Returns the count of items newly in QUEUED status (UPCOMING
    /// transitions plus fresh inserts).
    ///
    /// # Errors
    /// Returns `PipelineError::Enqueue` when the main discovery call fails;
    /// per-item failures are logged and retry-budgeted instead
    pub async fn enqueue_new_downloads(
        &self,
        feed_id: &str,
        feed_config: &FeedConfig,
        fetch_since_date: DateTime<Utc>,
    ) -> Result<usize, PipelineError> {
        tracing::info!(feed_id, "starting enqueue");
        let yt_cli_args = feed_config.yt_cli_args()?;

        self.ensure_discovered(feed_id).await?;

        let mut newly_queued = self
            .recheck_upcoming(feed_id, feed_config, &yt_cli_args)
            .await?;
        newly_queued += self
            .discover_new(feed_id, feed_config, &yt_cli_args, fetch_since_date)
            .await?;

        tracing::info!(feed_id, newly_queued, "enqueue completed");
        Ok(newly_queued)
    }

    /// First successful discovery classifies the source, records the
    /// resolved URL, and fills in feed metadata the config left unset.
    async fn ensure_discovered(&self, feed_id: &str) -> Result<(), PipelineError> {
        let feed = self
            .db
            .feeds()
            .get_feed_by_id(feed_id)
            .await
            .map_err(|err| PipelineError::database(feed_id, err))?;
        if feed.source_type != SourceType::Unknown {
            return Ok(());
        }

        let (resolved_url, source_type) = self
            .fetcher
            .discover_source(feed_id, &feed.source_url)
            .await
            .map_err(|err| {
                Self::enqueue_error(feed_id, "source discovery failed", Some(err))
            })?;

        self.db
            .feeds()
            .set_resolved_source(feed_id, source_type, resolved_url.as_deref())
            .await
            .map_err(|err| PipelineError::database(feed_id, err))?;
        tracing::info!(feed_id, %source_type, "source classified");

        let metadata_url = resolved_url.as_deref().unwrap_or(&feed.source_url);
        match self.fetcher.fetch_feed_metadata(feed_id, metadata_url).await {
            Ok(discovered) => {
                // config-provided metadata was written at reconcile time and
                // always wins; only fill what is still missing
                let update = FeedMetadataUpdate {
                    title: feed.title.is_none().then_some(discovered.title).flatten(),
                    description: feed
                        .description
                        .is_none()
                        .then_some(discovered.description)
                        .flatten(),
                    author: feed.author.is_none().then_some(discovered.author).flatten(),
                    remote_image_url: feed
                        .remote_image_url
                        .is_none()
                        .then_some(discovered.remote_image_url)
                        .flatten(),
                    ..FeedMetadataUpdate::default()
                };
                self.db
                    .feeds()
                    .update_feed_metadata(feed_id, &update)
                    .await
                    .map_err(|err| PipelineError::database(feed_id, err))?;
            }
            Err(err) => {
                tracing::warn!(feed_id, %err, "feed metadata extraction failed, continuing");
            }
        }
        Ok(())
    }

    /// Phase 1: re-fetch metadata for existing UPCOMING rows; transition the
    /// ones that became VODs, bump retries on the ones that went missing.
    async fn recheck_upcoming(
        &self,
        feed_id: &str,
        feed_config: &FeedConfig,
        yt_cli_args: &[String],
    ) -> Result<usize, PipelineError> {
        let upcoming = self
            .db
            .downloads()
            .get_downloads_by_status(DownloadStatus::Upcoming, Some(feed_id), None, -1, 0)
            .await
            .map_err(|err| PipelineError::database(feed_id, err))?;

        if upcoming.is_empty() {
            return Ok(0);
        }
        tracing::info!(feed_id, count = upcoming.len(), "re-checking upcoming downloads");

        let mut queued_count = 0;
        for db_download in upcoming {
            let fetched = match self
                .fetcher
                .fetch_downloads_metadata(
                    feed_id,
                    &db_download.source_url,
                    yt_cli_args,
                    None,
                    None,
                    feed_config.transcript_lang.as_deref(),
                    &feed_config.transcript_priority(),
                )
                .await
            {
                Ok(fetched) => fetched,
                Err(err) => {
                    tracing::warn!(
                        feed_id,
                        download_id = db_download.id,
                        %err,
                        "could not re-fetch metadata for upcoming download"
                    );
                    self.bump_upcoming_retries(
                        feed_id,
                        &db_download.id,
                        "Failed to re-fetch metadata for upcoming download during periodic check.",
                        feed_config.max_errors,
                    )
                    .await;
                    continue;
                }
            };

            let Some(refetched) = Self::match_refetched(&db_download, fetched) else {
                self.bump_upcoming_retries(
                    feed_id,
                    &db_download.id,
                    "Original ID not found in re-fetched metadata for upcoming item.",
                    feed_config.max_errors,
                )
                .await;
                continue;
            };

            match refetched.status {
                DownloadStatus::Queued => {
                    match self
                        .db
                        .downloads()
                        .mark_as_queued_from_upcoming(feed_id, &db_download.id)
                        .await
                    {
                        Ok(()) => {
                            queued_count += 1;
                            tracing::info!(
                                feed_id,
                                download_id = db_download.id,
                                "upcoming download transitioned to QUEUED"
                            );
                        }
                        Err(err) => {
                            tracing::error!(
                                feed_id,
                                download_id = db_download.id,
                                %err,
                                "failed to transition upcoming download to QUEUED"
                            );
                        }
                    }
                }
                DownloadStatus::Upcoming => {
                    tracing::debug!(
                        feed_id,
                        download_id = db_download.id,
                        "download is still upcoming"
                    );
                }
                other => {
                    tracing::info!(
                        feed_id,
                        download_id = db_download.id,
                        status = %other,
                        "re-fetched upcoming download has unexpected status, skipping"
                    );
                }
            }
        }
        Ok(queued_count)
    }

    pub(crate) fn match_refetched(
        db_download: &Download,
        fetched: Vec<Download>,
    ) -> Option<Download> {
        match fetched.len() {
            0 => None,
            1 => fetched
                .into_iter()
                .next()
                .filter(|item| item.id == db_download.id),
            n => {
                tracing::warn!(
                    feed_id = db_download.feed_id,
                    download_id = db_download.id,
                    results = n,
                    "metadata re-fetch returned multiple results, searching for original id"
                );
                fetched.into_iter().find(|item| item.id == db_download.id)
            }
        }
    }

    async fn bump_upcoming_retries(
        &self,
        feed_id: &str,
        download_id: &str,
        error_message: &str,
        max_errors: i64,
    ) {
        match self
            .db
            .downloads()
            .bump_retries(feed_id, download_id, error_message, max_errors)
            .await
        {
            Ok(outcome) if outcome.did_transition_to_error => {
                tracing::warn!(
                    feed_id,
                    download_id,
                    "upcoming download transitioned to ERROR after repeated re-fetch failures"
                );
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(
                    feed_id,
                    download_id,
                    %err,
                    "could not bump error count for upcoming download"
                );
            }
        }
    }

    /// Phase 2: enumerate the source filtered by the watermark (day floor)
    /// and upsert what came back.
    async fn discover_new(
        &self,
        feed_id: &str,
        feed_config: &FeedConfig,
        yt_cli_args: &[String],
        fetch_since_date: DateTime<Utc>,
    ) -> Result<usize, PipelineError> {
        let feed = self
            .db
            .feeds()
            .get_feed_by_id(feed_id)
            .await
            .map_err(|err| PipelineError::database(feed_id, err))?;
        let fetch_url = feed.resolved_url.as_deref().unwrap_or(&feed.source_url);

        // the epoch-min watermark means "everything"; no date filter then
        let since_filter =
            (fetch_since_date > DateTime::UNIX_EPOCH).then(|| day_floor(fetch_since_date));

        let fetched = self
            .fetcher
            .fetch_downloads_metadata(
                feed_id,
                fetch_url,
                yt_cli_args,
                since_filter,
                feed_config.keep_last,
                feed_config.transcript_lang.as_deref(),
                &feed_config.transcript_priority(),
            )
            .await
            .map_err(|err| {
                Self::enqueue_error(feed_id, "could not fetch main feed metadata", Some(err))
            })?;

        if fetched.is_empty() {
            tracing::debug!(feed_id, "no downloads returned from feed metadata fetch");
            return Ok(0);
        }

        let mut queued_count = 0;
        for fetched_dl in fetched {
            let existing = match self
                .db
                .downloads()
                .find_download_by_id(feed_id, &fetched_dl.id)
                .await
            {
                Ok(existing) => existing,
                Err(err) => {
                    tracing::error!(
                        feed_id,
                        download_id = fetched_dl.id,
                        %err,
                        "database error checking for existing download"
                    );
                    continue;
                }
            };

            match existing {
                None => {
                    let is_queued = fetched_dl.status == DownloadStatus::Queued;
                    match self.db.downloads().upsert_download(&fetched_dl).await {
                        Ok(()) => {
                            tracing::info!(
                                feed_id,
                                download_id = fetched_dl.id,
                                status = %fetched_dl.status,
                                "new download inserted"
                            );
                            if is_queued {
                                queued_count += 1;
                            }
                        }
                        Err(err) => {
                            tracing::error!(
                                feed_id,
                                download_id = fetched_dl.id,
                                %err,
                                "database error inserting new download"
                            );
                        }
                    }
                }
                Some(existing) => {
                    match (existing.status, fetched_dl.status) {
                        (DownloadStatus::Upcoming, DownloadStatus::Queued) => {
                            match self
                                .db
                                .downloads()
                                .mark_as_queued_from_upcoming(feed_id, &fetched_dl.id)
                                .await
                            {
                                Ok(()) => queued_count += 1,
                                Err(err) => {
                                    tracing::error!(
                                        feed_id,
                                        download_id = fetched_dl.id,
                                        %err,
                                        "failed to transition UPCOMING download to QUEUED"
                                    );
                                }
                            }
                        }
                        (DownloadStatus::Upcoming, DownloadStatus::Upcoming)
                        | (DownloadStatus::Queued, DownloadStatus::Queued) => {}
                        (DownloadStatus::Downloaded, _) => {
                            tracing::debug!(
                                feed_id,
                                download_id = fetched_dl.id,
                                "already downloaded, skipping"
                            );
                        }
                        (db_status, fetched_status) => {
                            tracing::info!(
                                feed_id,
                                download_id = fetched_dl.id,
                                %db_status,
                                %fetched_status,
                                "statuses diverge, upserting for consistency"
                            );
                            match self.db.downloads().upsert_download(&fetched_dl).await {
                                Ok(())
                                    if db_status != DownloadStatus::Queued
                                        && fetched_status == DownloadStatus::Queued =>
                                {
                                    queued_count += 1;
                                }
                                Ok(()) => {}
                                Err(err) => {
                                    tracing::error!(
                                        feed_id,
                                        download_id = fetched_dl.id,
                                        %err,
                                        "failed to upsert download for status consistency"
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(queued_count)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use anypod_core::{UPCOMING_EXT, UPCOMING_MIME, UPCOMING_SENTINEL};

    use super::*;

    fn upcoming(id: &str) -> Download {
        Download {
            feed_id: "f1".to_string(),
            id: id.to_string(),
            source_url: format!("https://example.com/watch?v={id}"),
            title: format!("episode {id}"),
            published: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            ext: UPCOMING_EXT.to_string(),
            mime_type: UPCOMING_MIME.to_string(),
            filesize: UPCOMING_SENTINEL,
            duration: UPCOMING_SENTINEL,
            status: DownloadStatus::Upcoming,
            discovered_at: None,
            updated_at: None,
            downloaded_at: None,
            remote_thumbnail_url: None,
            thumbnail_ext: None,
            description: None,
            quality_info: None,
            retries: 0,
            last_error: None,
            download_logs: None,
            playlist_index: None,
            transcript_ext: None,
            transcript_lang: None,
            transcript_source: None,
        }
    }

    fn queued(id: &str) -> Download {
        let mut download = upcoming(id);
        download.status = DownloadStatus::Queued;
        download.ext = "mp4".to_string();
        download
    }

    #[test]
    fn single_matching_result_is_accepted() {
        let db = upcoming("v1");
        let matched = Enqueuer::match_refetched(&db, vec![queued("v1")]);
        assert_eq!(matched.map(|d| d.status), Some(DownloadStatus::Queued));
    }

    #[test]
    fn single_mismatched_result_is_rejected() {
        let db = upcoming("v1");
        assert!(Enqueuer::match_refetched(&db, vec![queued("other")]).is_none());
    }

    #[test]
    fn multiple_results_are_searched_for_the_original_id() {
        let db = upcoming("v2");
        let matched = Enqueuer::match_refetched(&db, vec![queued("v1"), queued("v2"), queued("v3")]);
        assert_eq!(matched.map(|d| d.id), Some("v2".to_string()));
    }

    #[test]
    fn empty_results_are_no_match() {
        let db = upcoming("v1");
        assert!(Enqueuer::match_refetched(&db, Vec::new()).is_none());
    }
}
