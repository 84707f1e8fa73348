//! Aggregate results for a full feed pipeline run

use chrono::{DateTime, Utc};

use super::PhaseResult;

/// Comprehensive results from one `FeedCoordinator::process` invocation.
#[derive(Debug, Clone)]
pub struct ProcessingResults {
    pub feed_id: String,
    pub start_time: DateTime<Utc>,
    pub total_duration_seconds: f64,
    /// True if no fatal error occurred in the enqueue or RSS phases.
    pub overall_success: bool,

    pub enqueue_result: PhaseResult,
    pub download_result: PhaseResult,
    pub prune_result: PhaseResult,
    pub rss_result: PhaseResult,

    /// Whether `last_successful_sync` was advanced for the feed.
    pub feed_sync_updated: bool,
    /// A fatal error that stopped processing entirely, if any.
    pub fatal_error: Option<String>,
}

impl ProcessingResults {
    #[must_use]
    pub fn new(feed_id: String, start_time: DateTime<Utc>) -> Self {
        Self {
            feed_id,
            start_time,
            total_duration_seconds: 0.0,
            overall_success: false,
            enqueue_result: PhaseResult::default(),
            download_result: PhaseResult::default(),
            prune_result: PhaseResult::default(),
            rss_result: PhaseResult::default(),
            feed_sync_updated: false,
            fatal_error: None,
        }
    }

    #[must_use]
    pub const fn total_enqueued(&self) -> usize {
        self.enqueue_result.count
    }

    #[must_use]
    pub const fn total_downloaded(&self) -> usize {
        self.download_result.count
    }

    #[must_use]
    pub const fn total_archived(&self) -> usize {
        self.prune_result.count
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        usize::from(self.fatal_error.is_some())
            + self.enqueue_result.errors.len()
            + self.download_result.errors.len()
            + self.prune_result.errors.len()
            + self.rss_result.errors.len()
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}
