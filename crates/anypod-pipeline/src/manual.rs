//! Manual feed processing: out-of-band triggers and URL submissions
//!
//! The runner shares the scheduler's semaphore, so manual runs queue behind
//! scheduled runs instead of adding concurrency.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;

use anypod_core::DownloadStatus;
use anypod_db::Database;
use anypod_fetch::Fetcher;
use anypod_util::normalize_submission_url;

use crate::config::FeedConfig;
use crate::coordinator::FeedCoordinator;
use crate::PipelineError;

const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

/// Schedules coordinator runs for manual triggers without blocking HTTP
/// handlers, de-duplicated per feed.
pub struct ManualRunner {
    coordinator: Arc<FeedCoordinator>,
    semaphore: Arc<Semaphore>,
    queued_tasks: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl ManualRunner {
    #[must_use]
    pub fn new(coordinator: Arc<FeedCoordinator>, semaphore: Arc<Semaphore>) -> Self {
        Self {
            coordinator,
            semaphore,
            queued_tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Queue a run for the feed unless one is already pending.
    ///
    /// The spawned task waits on the shared semaphore, removes itself from
    /// the pending map, then runs the coordinator. A second trigger while
    /// the first is still pending is a silent no-op.
    pub async fn trigger(&self, feed_id: &str, feed_config: FeedConfig) {
        let mut tasks = self.queued_tasks.lock().await;
        if let Some(existing) = tasks.get(feed_id) {
            if !existing.is_finished() {
                tracing::debug!(feed_id, "manual processing already queued");
                return;
            }
        }

        let coordinator = Arc::clone(&self.coordinator);
        let semaphore = Arc::clone(&self.semaphore);
        let task_map = Arc::clone(&self.queued_tasks);
        let task_feed_id = feed_id.to_string();

        let handle = tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            task_map.lock().await.remove(&task_feed_id);

            tracing::info!(feed_id = task_feed_id, "manual feed processing started");
            let results = coordinator.process(&task_feed_id, &feed_config).await;
            tracing::info!(
                feed_id = task_feed_id,
                overall_success = results.overall_success,
                downloaded = results.total_downloaded(),
                "manual feed processing completed"
            );
        });
        tasks.insert(feed_id.to_string(), handle);
    }

    /// Cancel all pending tasks and wait briefly for them to wind down.
    pub async fn shutdown(&self) {
        let tasks: Vec<(String, JoinHandle<()>)> = {
            let mut map = self.queued_tasks.lock().await;
            map.drain().collect()
        };
        if tasks.is_empty() {
            return;
        }

        tracing::info!(count = tasks.len(), "cancelling manual feed tasks");
        for (_, handle) in &tasks {
            handle.abort();
        }
        let joins = tasks.into_iter().map(|(feed_id, handle)| async move {
            if let Err(err) = handle.await {
                if err.is_cancelled() {
                    tracing::warn!(feed_id, "manual feed task cancelled");
                } else {
                    tracing::error!(feed_id, %err, "manual feed task failed");
                }
            }
        });
        // bounded wait; aborted semaphore waiters resolve immediately anyway
        let _ = tokio::time::timeout(SHUTDOWN_WAIT, futures::future::join_all(joins)).await;
        tracing::info!("manual feed tasks cancelled");
    }
}

/// Result of a manual URL submission.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub download_id: String,
    pub status: DownloadStatus,
    pub is_new: bool,
    pub message: String,
    /// Whether the caller should fire a coordinator run.
    pub should_trigger: bool,
}

/// Validates manual submissions, fetches their metadata, and persists the
/// resulting record.
pub struct ManualSubmissionService {
    db: Database,
    fetcher: Arc<Fetcher>,
}

impl ManualSubmissionService {
    #[must_use]
    pub const fn new(db: Database, fetcher: Arc<Fetcher>) -> Self {
        Self { db, fetcher }
    }

    /// Accept a single URL for a manual feed.
    ///
    /// # Errors
    /// Returns `PipelineError::ManualSubmissionUnsupportedUrl` when the
    /// fetcher cannot process the URL, `ManualSubmissionUnavailable` for
    /// not-yet-started live/scheduled content, and `Database` on storage
    /// failures
    pub async fn submit(
        &self,
        feed_id: &str,
        feed_config: &FeedConfig,
        url: &str,
    ) -> Result<SubmissionOutcome, PipelineError> {
        let normalized_url = normalize_submission_url(url);
        tracing::debug!(feed_id, url = normalized_url, "fetching manual submission metadata");

        let yt_cli_args = feed_config.yt_cli_args()?;
        let downloads = self
            .fetcher
            .fetch_downloads_metadata(
                feed_id,
                &normalized_url,
                &yt_cli_args,
                None,
                None,
                feed_config.transcript_lang.as_deref(),
                &feed_config.transcript_priority(),
            )
            .await
            .map_err(|err| PipelineError::ManualSubmissionUnsupportedUrl {
                feed_id: feed_id.to_string(),
                url: normalized_url.clone(),
                source: Some(err),
            })?;

        let Some(mut download) = downloads.into_iter().next() else {
            return Err(PipelineError::ManualSubmissionUnsupportedUrl {
                feed_id: feed_id.to_string(),
                url: normalized_url,
                source: None,
            });
        };

        if download.status == DownloadStatus::Upcoming {
            return Err(PipelineError::ManualSubmissionUnavailable {
                feed_id: feed_id.to_string(),
                url: normalized_url,
            });
        }
        if download.status != DownloadStatus::Queued {
            tracing::warn!(
                feed_id,
                download_id = download.id,
                status = %download.status,
                "manual submission returned unexpected status, proceeding"
            );
        }

        let existing_status = match self
            .db
            .downloads()
            .find_download_by_id(feed_id, &download.id)
            .await
            .map_err(|err| PipelineError::database(feed_id, err))?
        {
            None => None,
            Some(existing) => {
                // keep the persisted status; the metadata refresh must not
                // resurrect or demote the item by itself
                download.status = existing.status;
                Some(existing.status)
            }
        };

        self.db
            .downloads()
            .upsert_download(&download)
            .await
            .map_err(|err| PipelineError::database(feed_id, err))?;

        let outcome = match existing_status {
            None => {
                tracing::info!(feed_id, download_id = download.id, "manual submission queued");
                SubmissionOutcome {
                    download_id: download.id,
                    status: DownloadStatus::Queued,
                    is_new: true,
                    message: "Download queued".to_string(),
                    should_trigger: true,
                }
            }
            Some(DownloadStatus::Downloaded) => {
                tracing::info!(
                    feed_id,
                    download_id = download.id,
                    "manual submission already downloaded"
                );
                SubmissionOutcome {
                    download_id: download.id,
                    status: DownloadStatus::Downloaded,
                    is_new: false,
                    message: "Download already completed".to_string(),
                    should_trigger: false,
                }
            }
            Some(from_status) => {
                self.db
                    .downloads()
                    .requeue_downloads(feed_id, Some(&[download.id.clone()]), None)
                    .await
                    .map_err(|err| PipelineError::database(feed_id, err))?;
                tracing::info!(
                    feed_id,
                    download_id = download.id,
                    %from_status,
                    "manual submission requeued existing download"
                );
                SubmissionOutcome {
                    download_id: download.id,
                    status: DownloadStatus::Queued,
                    is_new: false,
                    message: "Existing download requeued".to_string(),
                    should_trigger: true,
                }
            }
        };
        Ok(outcome)
    }
}
