//! Pipeline error kinds
//!
//! One rooted hierarchy; each layer wraps only what it can meaningfully
//! translate and preserves the cause chain.

use std::path::PathBuf;

use thiserror::Error;

use anypod_db::DbError;
use anypod_fetch::FetchError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to load configuration from {path}: {message}")]
    ConfigLoad { path: PathBuf, message: String },

    #[error("Database operation failed for feed {feed_id}: {source}")]
    Database {
        feed_id: String,
        #[source]
        source: DbError,
    },

    #[error("File operation failed on {path}: {source}")]
    FileOperation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Enqueue failed for feed {feed_id}: {message}")]
    Enqueue {
        feed_id: String,
        message: String,
        #[source]
        source: Option<FetchError>,
    },

    #[error("Prune failed for feed {feed_id}/{download_id}: {message}")]
    Prune {
        feed_id: String,
        download_id: String,
        message: String,
    },

    #[error("RSS generation failed for feed {feed_id}: {message}")]
    RssGeneration { feed_id: String, message: String },

    #[error("Image download failed for feed {feed_id} from {url}: {message}")]
    ImageDownload {
        feed_id: String,
        url: String,
        message: String,
    },

    #[error("State reconciliation failed for feed {feed_id}: {message}")]
    StateReconciliation { feed_id: String, message: String },

    #[error("Scheduler failure: {0}")]
    Scheduler(String),

    #[error("URL could not be processed by the fetcher: {url}")]
    ManualSubmissionUnsupportedUrl {
        feed_id: String,
        url: String,
        #[source]
        source: Option<FetchError>,
    },

    #[error("URL is not yet available as on-demand media: {url}")]
    ManualSubmissionUnavailable { feed_id: String, url: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl PipelineError {
    /// Wrap a database error with feed context.
    #[must_use]
    pub fn database(feed_id: impl Into<String>, source: DbError) -> Self {
        Self::Database {
            feed_id: feed_id.into(),
            source,
        }
    }

    #[must_use]
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileOperation {
            path: path.into(),
            source,
        }
    }
}
