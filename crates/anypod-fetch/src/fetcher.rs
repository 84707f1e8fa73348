//! High-level fetcher facade over yt-dlp
//!
//! Routes every operation through the host-specific handler for the URL and
//! owns the shared invocation settings (cookies, self-update channel).

use std::path::{Path, PathBuf};

use anypod_core::{Download, SourceType, TranscriptSource};

use crate::args::YtdlpArgs;
use crate::ffprobe::FfProbe;
use crate::handlers::{DiscoveredFeedMetadata as HandlerFeedMetadata, HandlerSelector};
use crate::process::ProcessScope;
use crate::runner::YtdlpRunner;
use crate::FetchError;

pub use crate::handlers::DiscoveredFeedMetadata;

const UPDATE_CHANNEL: &str = "stable";

/// A media file produced by a download call, still in the temp directory.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub path: PathBuf,
    pub ext: String,
    pub filesize: i64,
    /// Captured stderr from the fetcher run.
    pub logs: String,
}

/// Source-agnostic contract over yt-dlp: discovery, enumeration, per-item
/// metadata, media download, transcript download.
pub struct Fetcher {
    runner: YtdlpRunner,
    selector: HandlerSelector,
    cookies_path: Option<PathBuf>,
}

impl Fetcher {
    #[must_use]
    pub fn new(scope: ProcessScope, cookies_path: Option<PathBuf>) -> Self {
        let ffprobe = FfProbe::new(scope.clone());
        Self {
            runner: YtdlpRunner::new(scope),
            selector: HandlerSelector::new(ffprobe),
            cookies_path,
        }
    }

    fn base_args(&self, user_args: &[String]) -> YtdlpArgs {
        let args = YtdlpArgs::new(user_args);
        match &self.cookies_path {
            Some(path) => args.cookies(path.clone()),
            None => args,
        }
    }

    /// Classify a source URL and resolve the URL to enumerate from.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` when discovery fails or the URL is unsupported
    pub async fn discover_source(
        &self,
        feed_id: &str,
        url: &str,
    ) -> Result<(Option<String>, SourceType), FetchError> {
        let handler = self.selector.select(url)?;
        handler
            .determine_fetch_strategy(feed_id, url, self.base_args(&[]), &self.runner)
            .await
    }

    /// Extract feed-level metadata (title, description, author, image) from
    /// the source.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` when the metadata call or parse fails
    pub async fn fetch_feed_metadata(
        &self,
        feed_id: &str,
        url: &str,
    ) -> Result<HandlerFeedMetadata, FetchError> {
        let handler = self.selector.select(url)?;
        let args = handler.prepare_playlist_info_args(self.base_args(&[]).flat_playlist());
        let (info, _) = self.runner.extract_playlist_info(args, url).await?;
        handler.extract_feed_metadata(feed_id, &info)
    }

    /// Enumerate downloadable items for a source, optionally bounded by a
    /// publish-date floor and an item-count cap.
    ///
    /// Per-item parse failures are logged and skipped; items filtered out by
    /// the fetcher are dropped silently. The call as a whole fails only when
    /// the fetcher invocation itself fails.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` when the enumeration call fails
    #[allow(clippy::too_many_arguments)]
    pub async fn fetch_downloads_metadata(
        &self,
        feed_id: &str,
        url: &str,
        user_args: &[String],
        fetch_since_date: Option<chrono::DateTime<chrono::Utc>>,
        keep_last: Option<i64>,
        transcript_lang: Option<&str>,
        transcript_source_priority: &[TranscriptSource],
    ) -> Result<Vec<Download>, FetchError> {
        let handler = self.selector.select(url)?;

        let mut args = self.base_args(user_args);
        if let Some(since) = fetch_since_date {
            args = args.dateafter(since);
        }
        if let Some(keep_last) = keep_last {
            args = args.playlist_limit(keep_last);
        }
        let args = handler.prepare_downloads_info_args(args);

        let (infos, _) = self.runner.extract_downloads_info(args, url).await?;

        let mut downloads = Vec::with_capacity(infos.len());
        for info in &infos {
            match handler
                .extract_download_metadata(
                    feed_id,
                    info,
                    transcript_lang,
                    transcript_source_priority,
                )
                .await
            {
                Ok(download) => downloads.push(download),
                Err(FetchError::FilteredOut { download_id, .. }) => {
                    tracing::debug!(feed_id, download_id, "item filtered out by fetcher");
                }
                Err(err) => {
                    tracing::warn!(feed_id, %err, "skipping unparsable item");
                }
            }
        }
        Ok(downloads)
    }

    /// Download the media for one item into `tmp_dir`.
    ///
    /// The output lands as `<id>.<real_ext>`; the extension can differ from
    /// the metadata-time guess when the fetcher remuxes.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` when the download fails or no output file is
    /// found (e.g. the item was filtered out)
    pub async fn download_media(
        &self,
        download: &Download,
        user_args: &[String],
        tmp_dir: &Path,
    ) -> Result<FetchedMedia, FetchError> {
        let handler = self.selector.select(&download.source_url)?;
        let args = self
            .base_args(user_args)
            .output("%(id)s.%(ext)s")
            .paths_temp(tmp_dir)
            .paths_home(tmp_dir);
        let args = handler.prepare_media_download_args(args, download);

        let output = self.runner.download(args, &download.source_url).await?;

        let media_path = Self::find_output_file(tmp_dir, &download.id).await?.ok_or_else(|| {
            FetchError::YtdlpApi {
                url: download.source_url.clone(),
                message: format!(
                    "no output file for {} in {}; item may have been filtered out",
                    download.id,
                    tmp_dir.display()
                ),
            }
        })?;

        let ext = media_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or(&download.ext)
            .to_string();
        #[expect(clippy::cast_possible_wrap)]
        let filesize = tokio::fs::metadata(&media_path).await?.len() as i64;

        Ok(FetchedMedia {
            path: media_path,
            ext,
            filesize,
            logs: output.stderr,
        })
    }

    /// Download a transcript for one item into `target_dir`, trying each
    /// source in priority order. Returns the extension and winning source,
    /// or `None` when no transcript exists.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` when a fetcher invocation fails
    pub async fn download_transcript(
        &self,
        download: &Download,
        lang: &str,
        priority: &[TranscriptSource],
        target_dir: &Path,
    ) -> Result<Option<(String, TranscriptSource)>, FetchError> {
        let handler = self.selector.select(&download.source_url)?;

        for source in priority {
            let args = self
                .base_args(&[])
                .skip_download()
                .sub_langs(lang)
                .output("%(id)s.%(ext)s")
                .paths_home(target_dir);
            let args = match source {
                TranscriptSource::Creator => args.write_subs(),
                TranscriptSource::Auto => args.write_auto_subs(),
            };
            let args = handler.prepare_media_download_args(args, download);

            self.runner.download(args, &download.source_url).await?;

            if let Some(path) =
                Self::find_transcript_file(target_dir, &download.id, lang).await?
            {
                let ext = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .unwrap_or("vtt")
                    .to_string();
                return Ok(Some((ext, *source)));
            }
        }
        Ok(None)
    }

    /// Run the fetcher's self-update (rate limiting is the caller's job).
    ///
    /// # Errors
    ///
    /// Returns `FetchError` when the update invocation fails
    pub async fn self_update(&self) -> Result<(), FetchError> {
        self.runner.self_update(UPDATE_CHANNEL).await
    }

    async fn find_output_file(dir: &Path, id: &str) -> Result<Option<PathBuf>, FetchError> {
        let prefix = format!("{id}.");
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(&prefix)
                && !name.ends_with(".part")
                && !name.ends_with(".ytdl")
                && !name.ends_with(".incomplete")
            {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }

    async fn find_transcript_file(
        dir: &Path,
        id: &str,
        lang: &str,
    ) -> Result<Option<PathBuf>, FetchError> {
        let prefix = format!("{id}.{lang}.");
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(&prefix) {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }
}
