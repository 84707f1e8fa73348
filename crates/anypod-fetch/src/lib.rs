//! yt-dlp, ffprobe, and ffmpeg wrappers with per-host source handlers
//!
//! Everything external lives behind subprocess boundaries; this crate owns
//! the argument construction, JSON parsing, and host-specific strategy for
//! turning raw fetcher output into domain records.

mod args;
mod error;
mod fetcher;
mod ffmpeg;
mod ffprobe;
mod handlers;
mod info;
mod process;
mod runner;
mod thumbnails;

pub use args::YtdlpArgs;
pub use error::FetchError;
pub use fetcher::{DiscoveredFeedMetadata, Fetcher, FetchedMedia};
pub use ffmpeg::FfMpeg;
pub use ffprobe::FfProbe;
pub use handlers::{HandlerSelector, SourceHandler};
pub use info::YtdlpInfo;
pub use process::ProcessScope;
pub use runner::{RunOutput, YtdlpRunner};
pub use thumbnails::{Thumbnail, Thumbnails};

/// Map a file extension (without dot) to a MIME type string.
///
/// Podcast-relevant extensions that the OS table gets wrong are overridden;
/// the UPCOMING sentinel extension maps to `application/octet-stream`.
///
/// # Errors
///
/// Returns `FetchError::UnknownMimeType` when no mapping exists.
pub fn mime_type_for_ext(ext: &str) -> Result<String, FetchError> {
    match ext {
        anypod_core::UPCOMING_EXT => Ok(anypod_core::UPCOMING_MIME.to_string()),
        "m4a" => Ok("audio/mp4".to_string()),
        "flac" => Ok("audio/flac".to_string()),
        _ => mime_guess::from_ext(ext)
            .first()
            .map(|m| m.essence_str().to_string())
            .ok_or_else(|| FetchError::UnknownMimeType {
                ext: ext.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("mp4", "video/mp4")]
    #[test_case("m4a", "audio/mp4"; "m4a override")]
    #[test_case("flac", "audio/flac"; "flac override")]
    #[test_case("mp3", "audio/mpeg")]
    #[test_case("live", "application/octet-stream"; "upcoming sentinel")]
    fn maps_extensions(ext: &str, expected: &str) {
        assert_eq!(mime_type_for_ext(ext).unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_extension() {
        assert!(mime_type_for_ext("not-a-real-ext").is_err());
    }
}
