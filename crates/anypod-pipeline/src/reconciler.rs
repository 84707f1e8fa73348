//! Startup reconciliation between YAML configuration and database state

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use anypod_core::{DownloadStatus, Feed};
use anypod_db::Database;

use crate::config::FeedConfig;
use crate::stages::Pruner;
use crate::PipelineError;

/// Diffs the configured feed set against persisted feeds and applies
/// create/update/disable actions, including retention-policy restoration.
pub struct StateReconciler {
    db: Database,
    pruner: Arc<Pruner>,
}

impl StateReconciler {
    #[must_use]
    pub const fn new(db: Database, pruner: Arc<Pruner>) -> Self {
        Self { db, pruner }
    }

    /// Reconcile configuration with database state at startup.
    ///
    /// Returns the feed ids eligible for scheduling (present in config and
    /// enabled). Per-feed failures are logged and do not abort the run.
    ///
    /// # Errors
    /// Returns `PipelineError` only when the initial feed listing fails
    pub async fn reconcile_startup_state(
        &self,
        config_feeds: &BTreeMap<String, FeedConfig>,
    ) -> Result<Vec<String>, PipelineError> {
        tracing::info!(config_feed_count = config_feeds.len(), "starting state reconciliation");

        let db_feeds = self
            .db
            .feeds()
            .get_feeds(None)
            .await
            .map_err(|err| PipelineError::StateReconciliation {
                feed_id: "<all>".to_string(),
                message: format!("failed to fetch feeds from database: {err}"),
            })?;
        let db_feed_lookup: BTreeMap<String, Feed> =
            db_feeds.into_iter().map(|feed| (feed.id.clone(), feed)).collect();

        let mut ready_feeds = Vec::new();
        let mut new_count = 0;
        let mut changed_count = 0;
        let mut processed: HashSet<&str> = HashSet::new();

        for (feed_id, feed_config) in config_feeds {
            processed.insert(feed_id);
            match db_feed_lookup.get(feed_id) {
                None => match self.handle_new_feed(feed_id, feed_config).await {
                    Ok(()) => {
                        new_count += 1;
                        if feed_config.enabled {
                            ready_feeds.push(feed_id.clone());
                        }
                    }
                    Err(err) => {
                        tracing::warn!(feed_id, %err, "failed to add new feed, continuing with others");
                    }
                },
                Some(db_feed) => {
                    match self.handle_existing_feed(feed_id, feed_config, db_feed).await {
                        Ok(changed) => {
                            if changed {
                                changed_count += 1;
                            }
                            if feed_config.enabled {
                                ready_feeds.push(feed_id.clone());
                            }
                        }
                        Err(err) => {
                            tracing::warn!(feed_id, %err, "failed to update existing feed, continuing with others");
                        }
                    }
                }
            }
        }

        // feeds enabled in the DB but absent from config get fully archived
        let mut removed_count = 0;
        for (feed_id, db_feed) in &db_feed_lookup {
            if !processed.contains(feed_id.as_str()) && db_feed.is_enabled {
                match self.pruner.archive_feed(feed_id).await {
                    Ok(_) => removed_count += 1,
                    Err(err) => {
                        tracing::warn!(feed_id, %err, "failed to archive removed feed, continuing with others");
                    }
                }
            }
        }

        tracing::info!(
            new_feeds = new_count,
            removed_feeds = removed_count,
            changed_feeds = changed_count,
            ready_feeds = ready_feeds.len(),
            "state reconciliation completed"
        );
        Ok(ready_feeds)
    }

    async fn handle_new_feed(
        &self,
        feed_id: &str,
        feed_config: &FeedConfig,
    ) -> Result<(), PipelineError> {
        tracing::info!(feed_id, url = feed_config.url, "processing new feed");

        // the watermark starts at `since` when set, else the epoch minimum
        let initial_sync = feed_config.since.unwrap_or(DateTime::UNIX_EPOCH);

        let mut feed = Feed::new(feed_id.to_string(), feed_config.url.clone(), initial_sync);
        feed.is_enabled = feed_config.enabled;
        feed.since = feed_config.since;
        feed.keep_last = feed_config.keep_last;
        apply_metadata_overrides(&mut feed, feed_config);

        self.db
            .feeds()
            .upsert_feed(&feed)
            .await
            .map_err(|err| PipelineError::StateReconciliation {
                feed_id: feed_id.to_string(),
                message: format!("failed to insert new feed into database: {err}"),
            })
    }

    async fn handle_existing_feed(
        &self,
        feed_id: &str,
        feed_config: &FeedConfig,
        db_feed: &Feed,
    ) -> Result<bool, PipelineError> {
        let mut updated = db_feed.clone();

        match (feed_config.enabled, db_feed.is_enabled) {
            (true, false) => {
                tracing::info!(feed_id, "feed has been enabled");
                updated.is_enabled = true;
                updated.consecutive_failures = 0;
                updated.last_failed_sync = None;
                updated.last_successful_sync = DateTime::UNIX_EPOCH;
            }
            (false, true) => {
                tracing::info!(feed_id, "feed has been disabled");
                updated.is_enabled = false;
            }
            _ => {}
        }

        if feed_config.url != db_feed.source_url {
            tracing::info!(
                feed_id,
                old_url = db_feed.source_url,
                new_url = feed_config.url,
                "feed URL changed, updating and resetting error state"
            );
            updated.source_url = feed_config.url.clone();
            updated.consecutive_failures = 0;
            updated.last_failed_sync = None;
        }

        apply_metadata_overrides(&mut updated, feed_config);

        if feed_config.since != db_feed.since {
            updated.since = feed_config.since;
        }
        if feed_config.keep_last != db_feed.keep_last {
            updated.keep_last = feed_config.keep_last;
        }

        self.handle_pruning_changes(feed_id, feed_config.since, feed_config.keep_last, db_feed)
            .await?;

        if updated.content_equals(db_feed) {
            tracing::debug!(feed_id, "no feed configuration changes detected");
            Ok(false)
        } else {
            self.db.feeds().upsert_feed(&updated).await.map_err(|err| {
                PipelineError::StateReconciliation {
                    feed_id: feed_id.to_string(),
                    message: format!("failed to update feed configuration: {err}"),
                }
            })?;
            tracing::info!(feed_id, "feed configuration changes applied");
            Ok(true)
        }
    }

    /// Restoration when retention is loosened: previously ARCHIVED items now
    /// inside the window go back to QUEUED.
    ///
    /// Both policy tables are evaluated literally and in order; `keep_last`
    /// can widen, cap, or veto what the `since` change decided.
    async fn handle_pruning_changes(
        &self,
        feed_id: &str,
        config_since: Option<DateTime<Utc>>,
        config_keep_last: Option<i64>,
        db_feed: &Feed,
    ) -> Result<bool, PipelineError> {
        let since_changed = config_since != db_feed.since;
        let keep_last_changed = config_keep_last != db_feed.keep_last;
        if !since_changed && !keep_last_changed {
            return Ok(false);
        }

        let (mut should_restore, restore_filter_date) = match (db_feed.since, config_since) {
            (None, None) => (false, None),
            // filter added: stricter, the pruner handles it
            (None, Some(_)) => (false, None),
            // filter removed: all archived downloads become candidates
            (Some(db_since), None) => {
                tracing::info!(feed_id, %db_since, "'since' filter removed, considering all archived downloads");
                (true, None)
            }
            // filter expanded to an earlier date: restore the newly-in-window slice
            (Some(db_since), Some(new_since)) if new_since < db_since => {
                tracing::info!(feed_id, %db_since, %new_since, "'since' date expanded, considering downloads after the new date");
                (true, Some(new_since))
            }
            // unchanged or stricter
            (Some(_), Some(_)) => (false, None),
        };

        let restore_limit = match (db_feed.keep_last, config_keep_last, db_feed.total_downloads)
        {
            (None, None, _) => -1,
            (_, Some(new_keep), total) if new_keep > total => {
                let available_slots = new_keep - total;
                tracing::info!(feed_id, available_slots, "'keep_last' allows restoration");
                should_restore = true;
                available_slots
            }
            (Some(old_keep), None, _) => {
                tracing::info!(feed_id, old_keep, "'keep_last' filter removed, considering all archived downloads");
                should_restore = true;
                -1
            }
            // keep_last at or below the current downloaded count vetoes any
            // restoration the since change proposed
            (_, Some(_), _) => {
                should_restore = false;
                -1
            }
        };

        if !should_restore {
            return Ok(false);
        }

        let to_restore = self
            .db
            .downloads()
            .get_downloads_by_status(
                DownloadStatus::Archived,
                Some(feed_id),
                restore_filter_date,
                restore_limit,
                0,
            )
            .await
            .map_err(|err| PipelineError::StateReconciliation {
                feed_id: feed_id.to_string(),
                message: format!("failed to fetch archived downloads for retention check: {err}"),
            })?;

        if to_restore.is_empty() {
            tracing::debug!(feed_id, "no archived downloads to restore");
            return Ok(false);
        }

        let ids: Vec<String> = to_restore.into_iter().map(|d| d.id).collect();
        let count = self
            .db
            .downloads()
            .requeue_downloads(feed_id, Some(&ids), Some(DownloadStatus::Archived))
            .await
            .map_err(|err| PipelineError::StateReconciliation {
                feed_id: feed_id.to_string(),
                message: format!("failed to restore archived downloads: {err}"),
            })?;

        tracing::info!(feed_id, count, "restored archived downloads to QUEUED");
        Ok(true)
    }
}

/// Config-provided metadata always wins over whatever is persisted; unset
/// fields are left alone.
fn apply_metadata_overrides(feed: &mut Feed, feed_config: &FeedConfig) {
    let Some(metadata) = &feed_config.metadata else {
        return;
    };
    if let Some(title) = &metadata.title {
        feed.title = Some(title.clone());
    }
    if let Some(subtitle) = &metadata.subtitle {
        feed.subtitle = Some(subtitle.clone());
    }
    if let Some(description) = &metadata.description {
        feed.description = Some(description.clone());
    }
    if let Some(language) = &metadata.language {
        feed.language = Some(language.clone());
    }
    if let Some(author) = &metadata.author {
        feed.author = Some(author.clone());
    }
    if let Some(author_email) = &metadata.author_email {
        feed.author_email = Some(author_email.clone());
    }
    if let Some(image_url) = &metadata.image_url {
        feed.remote_image_url = Some(image_url.clone());
    }
    if let Some(categories) = &metadata.categories {
        feed.category = categories.clone();
    }
    if let Some(podcast_type) = metadata.podcast_type {
        feed.podcast_type = podcast_type;
    }
    if let Some(explicit) = metadata.explicit {
        feed.explicit = explicit;
    }
}
