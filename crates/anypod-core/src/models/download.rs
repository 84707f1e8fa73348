//! Download model (one media item, one podcast episode)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{DownloadStatus, TranscriptSource};

/// Sentinel extension used for UPCOMING (live/scheduled) items.
pub const UPCOMING_EXT: &str = "live";
/// Sentinel MIME type used for UPCOMING items.
pub const UPCOMING_MIME: &str = "application/octet-stream";
/// Sentinel filesize/duration for UPCOMING items (real values arrive on download).
pub const UPCOMING_SENTINEL: i64 = 1;

/// A single media item belonging to exactly one feed.
///
/// Composite key `(feed_id, id)` where `id` is the source-assigned stable
/// identifier. `discovered_at`, `updated_at`, and `downloaded_at` are
/// maintained by database triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Download {
    pub feed_id: String,
    pub id: String,

    pub source_url: String,
    pub title: String,
    pub published: DateTime<Utc>,

    // media details
    pub ext: String,
    pub mime_type: String,
    pub filesize: i64,
    pub duration: i64,

    pub status: DownloadStatus,

    pub discovered_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub downloaded_at: Option<DateTime<Utc>>,

    // optional media metadata
    pub remote_thumbnail_url: Option<String>,
    pub thumbnail_ext: Option<String>,
    pub description: Option<String>,
    pub quality_info: Option<String>,

    // error tracking
    pub retries: i64,
    pub last_error: Option<String>,
    pub download_logs: Option<String>,

    // multi-attachment posts (e.g. Patreon): 1-based item position
    pub playlist_index: Option<i64>,

    // transcripts
    pub transcript_ext: Option<String>,
    pub transcript_lang: Option<String>,
    pub transcript_source: Option<TranscriptSource>,
}

impl Download {
    /// Compare downloads excluding the trigger-managed timestamp fields.
    #[must_use]
    pub fn content_equals(&self, other: &Self) -> bool {
        let strip = |dl: &Self| {
            let mut d = dl.clone();
            d.discovered_at = None;
            d.updated_at = None;
            d.downloaded_at = None;
            d
        };
        strip(self) == strip(other)
    }
}
