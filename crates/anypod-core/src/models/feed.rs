//! Feed model (one subscribable source, one RSS file)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::podcast::{PodcastCategories, PodcastExplicit, PodcastType};

use super::SourceType;

/// A durable feed record keyed by an operator-assigned identifier.
///
/// `total_downloads` is maintained by database triggers and is never
/// written directly by application code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Feed {
    pub id: String,
    pub is_enabled: bool,
    pub source_type: SourceType,
    pub source_url: String,
    pub resolved_url: Option<String>,

    // time keeping
    pub last_successful_sync: DateTime<Utc>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_rss_generation: Option<DateTime<Utc>>,

    // error tracking
    pub last_failed_sync: Option<DateTime<Utc>>,
    pub consecutive_failures: i64,
    pub last_error: Option<String>,

    // download metrics (trigger-maintained)
    pub total_downloads: i64,

    // retention policies
    pub since: Option<DateTime<Utc>>,
    pub keep_last: Option<i64>,

    // feed metadata
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub author: Option<String>,
    pub author_email: Option<String>,
    pub remote_image_url: Option<String>,
    pub image_ext: Option<String>,
    #[sqlx(try_from = "String")]
    pub category: PodcastCategories,
    pub podcast_type: PodcastType,
    pub explicit: PodcastExplicit,
}

impl Feed {
    /// Build a new feed row with defaults for everything the database or
    /// later discovery fills in.
    #[must_use]
    pub fn new(
        id: String,
        source_url: String,
        last_successful_sync: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            is_enabled: true,
            source_type: SourceType::Unknown,
            source_url,
            resolved_url: None,
            last_successful_sync,
            created_at: None,
            updated_at: None,
            last_rss_generation: None,
            last_failed_sync: None,
            consecutive_failures: 0,
            last_error: None,
            total_downloads: 0,
            since: None,
            keep_last: None,
            title: None,
            subtitle: None,
            description: None,
            language: None,
            author: None,
            author_email: None,
            remote_image_url: None,
            image_ext: None,
            category: PodcastCategories::default(),
            podcast_type: PodcastType::Episodic,
            explicit: PodcastExplicit::No,
        }
    }

    /// Compare feeds excluding database-managed timestamp and counter fields.
    #[must_use]
    pub fn content_equals(&self, other: &Self) -> bool {
        let strip = |feed: &Self| {
            let mut f = feed.clone();
            f.created_at = None;
            f.updated_at = None;
            f.total_downloads = 0;
            f
        };
        strip(self) == strip(other)
    }
}
