//! Source-specific strategy and parsing for yt-dlp operations
//!
//! Each handler encapsulates one host's quirks: URL classification, request
//! decoration (referers, filters), and mapping raw metadata into domain
//! records. The selector routes by hostname suffix; YouTube is the default.

mod patreon;
mod twitter;
mod youtube;

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use anypod_core::{Download, SourceType, TranscriptSource};

use crate::args::YtdlpArgs;
use crate::ffprobe::FfProbe;
use crate::info::YtdlpInfo;
use crate::runner::YtdlpRunner;
use crate::FetchError;

pub use patreon::PatreonHandler;
pub use twitter::TwitterHandler;
pub use youtube::YoutubeHandler;

/// Feed-level metadata extracted during discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredFeedMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub remote_image_url: Option<String>,
}

/// Interface for source-specific strategy and parsing logic.
#[async_trait]
pub trait SourceHandler: Send + Sync {
    /// Classify the initial URL and determine the final URL to fetch
    /// downloads from.
    async fn determine_fetch_strategy(
        &self,
        feed_id: &str,
        initial_url: &str,
        base_args: YtdlpArgs,
        runner: &YtdlpRunner,
    ) -> Result<(Option<String>, SourceType), FetchError>;

    /// Decorate args for playlist/feed metadata extraction.
    fn prepare_playlist_info_args(&self, args: YtdlpArgs) -> YtdlpArgs {
        args
    }

    /// Extract feed-level metadata from a playlist-info response.
    fn extract_feed_metadata(
        &self,
        feed_id: &str,
        info: &YtdlpInfo,
    ) -> Result<DiscoveredFeedMetadata, FetchError>;

    /// Decorate args for downloads metadata enumeration.
    fn prepare_downloads_info_args(&self, args: YtdlpArgs) -> YtdlpArgs {
        args
    }

    /// Map one yt-dlp item document into a `Download` record.
    async fn extract_download_metadata(
        &self,
        feed_id: &str,
        info: &YtdlpInfo,
        transcript_lang: Option<&str>,
        transcript_source_priority: &[TranscriptSource],
    ) -> Result<Download, FetchError>;

    /// Decorate args for media download operations.
    fn prepare_media_download_args(&self, args: YtdlpArgs, download: &Download) -> YtdlpArgs {
        let _ = download;
        args
    }
}

/// Resolves source handlers based on URL hostnames.
pub struct HandlerSelector {
    default_handler: Arc<dyn SourceHandler>,
    hostname_handlers: Vec<(&'static str, Arc<dyn SourceHandler>)>,
}

impl HandlerSelector {
    #[must_use]
    pub fn new(ffprobe: FfProbe) -> Self {
        Self {
            default_handler: Arc::new(YoutubeHandler),
            hostname_handlers: vec![
                ("patreon.com", Arc::new(PatreonHandler::new(ffprobe))),
                ("twitter.com", Arc::new(TwitterHandler)),
                ("x.com", Arc::new(TwitterHandler)),
            ],
        }
    }

    /// Return the registered handler for `url`, falling back to the default
    /// when no hostname-specific handler matches.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::InvalidUrl` when the URL has no parsable hostname
    pub fn select(&self, url: &str) -> Result<Arc<dyn SourceHandler>, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        let hostname = parsed
            .host_str()
            .ok_or_else(|| FetchError::InvalidUrl(format!("URL has no hostname: {url}")))?
            .to_lowercase();

        for (suffix, handler) in &self.hostname_handlers {
            if hostname == *suffix || hostname.ends_with(&format!(".{suffix}")) {
                return Ok(Arc::clone(handler));
            }
        }
        Ok(Arc::clone(&self.default_handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessScope;

    fn selector() -> HandlerSelector {
        HandlerSelector::new(FfProbe::new(ProcessScope::new()))
    }

    #[test]
    fn routes_by_hostname_suffix() {
        let selector = selector();
        // no panic means a handler resolved; classification behavior is
        // covered by the per-handler tests
        assert!(selector.select("https://www.patreon.com/c/somecreator").is_ok());
        assert!(selector.select("https://x.com/user/status/123").is_ok());
        assert!(selector.select("https://www.youtube.com/@somechannel").is_ok());
        assert!(selector.select("https://vimeo.com/12345").is_ok());
    }

    #[test]
    fn rejects_urls_without_hostname() {
        let selector = selector();
        assert!(matches!(
            selector.select("not a url"),
            Err(FetchError::InvalidUrl(_))
        ));
    }
}
