//! Database error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Feed not found: {feed_id}")]
    FeedNotFound { feed_id: String },

    #[error("Download not found: {feed_id}/{download_id}")]
    DownloadNotFound {
        feed_id: String,
        download_id: String,
    },

    #[error("Invalid status transition for {feed_id}/{download_id}: {detail}")]
    InvalidTransition {
        feed_id: String,
        download_id: String,
        detail: String,
    },

    #[error("Update affected {actual} rows, expected {expected} ({context})")]
    UnexpectedRowCount {
        expected: u64,
        actual: u64,
        context: String,
    },
}
