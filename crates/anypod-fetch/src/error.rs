//! Fetcher error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("yt-dlp executable not found; ensure yt-dlp is installed and in PATH")]
    YtdlpNotFound,

    #[error("yt-dlp call failed for {url}: {message}")]
    YtdlpApi { url: String, message: String },

    #[error("{handler} parser: {message} (feed {feed_id}, download {download_id})")]
    YtdlpData {
        handler: &'static str,
        feed_id: String,
        download_id: String,
        message: String,
    },

    #[error("Required field missing from yt-dlp output: {field}")]
    FieldMissing { field: &'static str },

    #[error("Field {field} has unexpected type in yt-dlp output: {actual}")]
    FieldInvalid { field: &'static str, actual: String },

    #[error("Item filtered out by yt-dlp (feed {feed_id}, download {download_id})")]
    FilteredOut {
        feed_id: String,
        download_id: String,
    },

    #[error("ffprobe failed: {message}")]
    FfProbe {
        message: String,
        stderr: Option<String>,
    },

    #[error("ffmpeg failed: {message}")]
    FfMpeg {
        message: String,
        stderr: Option<String>,
    },

    #[error("Could not determine MIME type for extension '{ext}'")]
    UnknownMimeType { ext: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Subprocess I/O failure: {0}")]
    Io(#[from] std::io::Error),
}
