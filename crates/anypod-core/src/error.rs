//! Core error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid feed id: {0} (1-255 chars, [A-Za-z0-9_-])")]
    InvalidFeedId(String),

    #[error("Invalid download status: {0}")]
    InvalidDownloadStatus(String),

    #[error("Invalid source type: {0}")]
    InvalidSourceType(String),

    #[error(
        "Invalid Apple Podcasts category: {0}. See \
         https://podcasters.apple.com/support/1691-apple-podcasts-categories \
         for a list of valid categories."
    )]
    InvalidCategory(String),

    #[error("Maximum 2 categories allowed, got {0}")]
    TooManyCategories(usize),

    #[error("Empty categories are not allowed")]
    EmptyCategories,

    #[error("Invalid explicit value: {0} (expected true/false/yes/no/clean)")]
    InvalidExplicit(String),

    #[error("Invalid podcast type: {0} (expected episodic or serial)")]
    InvalidPodcastType(String),

    #[error("Invalid transcript source: {0} (expected creator or auto)")]
    InvalidTranscriptSource(String),

    #[error("Could not determine MIME type for extension '{0}'")]
    UnknownMimeType(String),
}
