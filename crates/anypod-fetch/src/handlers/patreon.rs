//! Patreon-specific handler
//!
//! Campaign pages behave like playlists and individual posts like single
//! videos. Requests need a Patreon referer, and posts frequently omit
//! duration, which is then probed over HTTP with ffprobe.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use anypod_core::{Download, DownloadStatus, SourceType, TranscriptSource};

use super::{DiscoveredFeedMetadata, SourceHandler};
use crate::args::YtdlpArgs;
use crate::ffprobe::FfProbe;
use crate::info::YtdlpInfo;
use crate::runner::YtdlpRunner;
use crate::{mime_type_for_ext, FetchError};

const HANDLER: &str = "Patreon";
const PATREON_REFERER: &str = "https://www.patreon.com";

fn data_error(feed_id: &str, download_id: &str, message: impl Into<String>) -> FetchError {
    FetchError::YtdlpData {
        handler: HANDLER,
        feed_id: feed_id.to_string(),
        download_id: download_id.to_string(),
        message: message.into(),
    }
}

struct PatreonEntry<'a> {
    info: &'a YtdlpInfo,
    feed_id: &'a str,
    download_id: String,
}

impl<'a> PatreonEntry<'a> {
    fn new(info: &'a YtdlpInfo, feed_id: &'a str) -> Result<Self, FetchError> {
        let download_id = info
            .req_str("id")
            .map_err(|err| data_error(feed_id, "<missing_id>", err.to_string()))?
            .to_string();
        Ok(Self {
            info,
            feed_id,
            download_id,
        })
    }

    fn err(&self, message: impl Into<String>) -> FetchError {
        data_error(self.feed_id, &self.download_id, message)
    }

    fn str_field(&self, field: &'static str) -> Result<Option<&str>, FetchError> {
        self.info.get_str(field).map_err(|e| self.err(e.to_string()))
    }

    fn published(&self) -> Result<Option<DateTime<Utc>>, FetchError> {
        match self
            .info
            .get_i64("timestamp")
            .map_err(|e| self.err(e.to_string()))?
        {
            None => Ok(None),
            Some(ts) => DateTime::from_timestamp(ts, 0)
                .map(Some)
                .ok_or_else(|| self.err(format!("invalid timestamp: '{ts}'"))),
        }
    }

    fn filesize(&self) -> Result<i64, FetchError> {
        let raw = self
            .info
            .get_i64("filesize")
            .map_err(|e| self.err(e.to_string()))?
            .or(self
                .info
                .get_i64("filesize_approx")
                .map_err(|e| self.err(e.to_string()))?);
        match raw {
            None => {
                tracing::warn!(
                    feed_id = self.feed_id,
                    download_id = self.download_id,
                    "metadata missing filesize, using placeholder"
                );
                Ok(anypod_core::UPCOMING_SENTINEL)
            }
            Some(size) if size > 0 => Ok(size),
            Some(size) => Err(self.err(format!("invalid filesize: {size}"))),
        }
    }

    fn thumbnail(&self) -> Result<Option<String>, FetchError> {
        if let Some(thumbnails) = self.info.thumbnails() {
            if let Some(best) = thumbnails.best_supported() {
                return Ok(best.url.clone());
            }
            if !thumbnails.is_empty() {
                tracing::warn!(
                    feed_id = self.feed_id,
                    download_id = self.download_id,
                    "no JPG/PNG thumbnails available for entry"
                );
                return Ok(None);
            }
        }
        Ok(self.str_field("thumbnail")?.map(String::from))
    }

    /// Candidate media URLs for duration probing, in contract order:
    /// `requested_downloads[0]` (url then `manifest_url`), top-level `url`,
    /// first format's url/`manifest_url`.
    fn probe_candidates(&self) -> Vec<(&'static str, String)> {
        let mut candidates = Vec::new();

        let url_of = |value: &Value| {
            value
                .get("url")
                .and_then(Value::as_str)
                .or_else(|| value.get("manifest_url").and_then(Value::as_str))
                .map(String::from)
        };

        if let Some(Value::Array(rd_list)) = self.info.raw("requested_downloads") {
            if let Some(url) = rd_list.first().and_then(url_of) {
                candidates.push(("requested_downloads", url));
            }
        }
        if let Some(url) = self
            .info
            .get_str("url")
            .ok()
            .flatten()
        {
            candidates.push(("media_url", url.to_string()));
        }
        if let Some(Value::Array(formats)) = self.info.raw("formats") {
            if let Some(url) = formats.first().and_then(url_of) {
                candidates.push(("first_format_url", url));
            }
        }
        candidates
    }

    fn quality_info(&self) -> Result<Option<String>, FetchError> {
        let mut parts: Vec<String> = Vec::new();
        if let Some(resolution) = self.str_field("resolution")? {
            parts.push(resolution.to_string());
        } else if let Some(height) = self
            .info
            .get_i64("height")
            .map_err(|e| self.err(e.to_string()))?
        {
            parts.push(format!("{height}p"));
        }
        match self.str_field("acodec")? {
            None | Some("none") => {}
            Some(acodec) => parts.push(acodec.to_string()),
        }
        Ok(if parts.is_empty() {
            None
        } else {
            Some(parts.join(" | "))
        })
    }
}

/// Patreon implementation of the source handler protocol.
pub struct PatreonHandler {
    ffprobe: FfProbe,
}

impl PatreonHandler {
    #[must_use]
    pub const fn new(ffprobe: FfProbe) -> Self {
        Self { ffprobe }
    }

    async fn probe_duration(
        &self,
        feed_id: &str,
        entry: &PatreonEntry<'_>,
    ) -> Result<i64, FetchError> {
        let Some((source, url)) = entry.probe_candidates().into_iter().next() else {
            return Err(data_error(
                feed_id,
                &entry.download_id,
                "no media URL candidates found for duration probing",
            ));
        };

        tracing::debug!(
            feed_id,
            download_id = entry.download_id,
            candidate_source = source,
            "probing duration with ffprobe"
        );
        let duration = self
            .ffprobe
            .duration_from_url(&url, &[("Referer", PATREON_REFERER)])
            .await
            .map_err(|err| {
                data_error(
                    feed_id,
                    &entry.download_id,
                    format!("failed to probe duration from media URL: {err}"),
                )
            })?;

        if duration <= 0 {
            return Err(data_error(
                feed_id,
                &entry.download_id,
                "invalid duration after probing",
            ));
        }
        Ok(duration)
    }
}

#[async_trait]
impl SourceHandler for PatreonHandler {
    async fn determine_fetch_strategy(
        &self,
        feed_id: &str,
        initial_url: &str,
        base_args: YtdlpArgs,
        runner: &YtdlpRunner,
    ) -> Result<(Option<String>, SourceType), FetchError> {
        let discovery_args = base_args
            .skip_download()
            .flat_playlist()
            .referer(PATREON_REFERER);
        let (info, _) = runner.extract_playlist_info(discovery_args, initial_url).await?;

        let entry = PatreonEntry::new(&info, feed_id)?;
        let fetch_url = entry
            .str_field("webpage_url")?
            .map_or_else(|| initial_url.to_string(), String::from);
        let extractor = entry.str_field("extractor")?.map(str::to_lowercase);
        let entry_type = entry.str_field("_type")?;

        if entry_type == Some("playlist") || extractor.as_deref() == Some("patreon:campaign") {
            return Ok((Some(fetch_url), SourceType::Playlist));
        }
        if matches!(entry_type, Some("video" | "url")) || extractor.as_deref() == Some("patreon")
        {
            return Ok((Some(fetch_url), SourceType::SingleVideo));
        }

        tracing::warn!(
            feed_id,
            extractor = extractor.as_deref().unwrap_or("<unknown>"),
            "unhandled Patreon URL classification, defaulting to unknown"
        );
        Ok((Some(fetch_url), SourceType::Unknown))
    }

    fn prepare_playlist_info_args(&self, args: YtdlpArgs) -> YtdlpArgs {
        args.referer(PATREON_REFERER)
    }

    fn extract_feed_metadata(
        &self,
        feed_id: &str,
        info: &YtdlpInfo,
    ) -> Result<DiscoveredFeedMetadata, FetchError> {
        let entry = PatreonEntry::new(info, feed_id)?;
        let author = entry
            .str_field("channel")?
            .or(entry.str_field("uploader")?)
            .map(String::from);
        Ok(DiscoveredFeedMetadata {
            title: entry.str_field("title")?.map(String::from),
            description: entry.str_field("description")?.map(String::from),
            author,
            remote_image_url: entry.thumbnail()?,
        })
    }

    fn prepare_downloads_info_args(&self, args: YtdlpArgs) -> YtdlpArgs {
        // vcodec filter drops text-only and image-only attachments
        args.referer(PATREON_REFERER).match_filter("vcodec")
    }

    async fn extract_download_metadata(
        &self,
        feed_id: &str,
        info: &YtdlpInfo,
        _transcript_lang: Option<&str>,
        _transcript_source_priority: &[TranscriptSource],
    ) -> Result<Download, FetchError> {
        let entry = PatreonEntry::new(info, feed_id)?;

        let source_url = entry
            .str_field("webpage_url")?
            .or(entry.str_field("original_url")?)
            .map_or_else(
                || format!("https://www.patreon.com/posts/{}", entry.download_id),
                String::from,
            );

        let published = entry
            .published()?
            .ok_or_else(|| entry.err("missing published datetime"))?;

        let Some(ext) = entry.str_field("ext")? else {
            return Err(FetchError::FilteredOut {
                feed_id: feed_id.to_string(),
                download_id: entry.download_id,
            });
        };
        let ext = ext.to_string();
        let mime_type = mime_type_for_ext(&ext).map_err(|e| entry.err(e.to_string()))?;

        let mut duration = info
            .duration_seconds()
            .map_err(|e| entry.err(e.to_string()))?
            .unwrap_or(0);
        if duration <= 0 {
            duration = self.probe_duration(feed_id, &entry).await?;
        }

        let playlist_index = info
            .get_i64("playlist_index")
            .map_err(|e| entry.err(e.to_string()))?;

        Ok(Download {
            feed_id: feed_id.to_string(),
            id: entry.download_id.clone(),
            source_url,
            title: entry
                .str_field("title")?
                .ok_or_else(|| entry.err("missing title"))?
                .to_string(),
            published,
            ext,
            mime_type,
            filesize: entry.filesize()?,
            duration,
            status: DownloadStatus::Queued,
            discovered_at: None,
            updated_at: None,
            downloaded_at: None,
            remote_thumbnail_url: entry.thumbnail()?,
            thumbnail_ext: None,
            description: entry.str_field("description")?.map(String::from),
            quality_info: entry.quality_info()?,
            retries: 0,
            last_error: None,
            download_logs: None,
            playlist_index,
            transcript_ext: None,
            transcript_lang: None,
            transcript_source: None,
        })
    }

    fn prepare_media_download_args(&self, args: YtdlpArgs, download: &Download) -> YtdlpArgs {
        let args = args.referer(PATREON_REFERER);
        // multi-attachment posts carry the 1-based index of their artifact
        match download.playlist_index {
            Some(index) => args.playlist_items(index),
            None => args,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::process::ProcessScope;

    fn handler() -> PatreonHandler {
        PatreonHandler::new(FfProbe::new(ProcessScope::new()))
    }

    #[tokio::test]
    async fn parses_audio_post_with_duration() {
        let info = YtdlpInfo::new(json!({
            "id": "98765",
            "title": "Bonus Episode",
            "webpage_url": "https://www.patreon.com/posts/98765",
            "ext": "mp3",
            "timestamp": 1_700_000_000,
            "duration": 1800,
            "filesize": 2_000_000,
            "playlist_index": 2,
            "acodec": "mp3",
        }));

        let download = handler()
            .extract_download_metadata("f1", &info, None, &[])
            .await
            .unwrap();
        assert_eq!(download.status, DownloadStatus::Queued);
        assert_eq!(download.mime_type, "audio/mpeg");
        assert_eq!(download.playlist_index, Some(2));
        assert_eq!(download.duration, 1800);
    }

    #[test]
    fn probe_candidates_preserve_contract_order() {
        let info = YtdlpInfo::new(json!({
            "id": "98765",
            "url": "https://media.patreon.com/top.mp3",
            "requested_downloads": [
                {"url": "https://media.patreon.com/rd.mp3"},
            ],
            "formats": [
                {"manifest_url": "https://media.patreon.com/fmt.m3u8"},
            ],
        }));
        let entry = PatreonEntry::new(&info, "f1").unwrap();
        let candidates = entry.probe_candidates();
        assert_eq!(
            candidates
                .iter()
                .map(|(source, url)| (*source, url.as_str()))
                .collect::<Vec<_>>(),
            vec![
                ("requested_downloads", "https://media.patreon.com/rd.mp3"),
                ("media_url", "https://media.patreon.com/top.mp3"),
                ("first_format_url", "https://media.patreon.com/fmt.m3u8"),
            ]
        );
    }

    #[test]
    fn requested_downloads_prefers_url_over_manifest() {
        let info = YtdlpInfo::new(json!({
            "id": "98765",
            "requested_downloads": [
                {"manifest_url": "https://media.patreon.com/rd.m3u8"},
            ],
        }));
        let entry = PatreonEntry::new(&info, "f1").unwrap();
        assert_eq!(
            entry.probe_candidates(),
            vec![(
                "requested_downloads",
                "https://media.patreon.com/rd.m3u8".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn media_download_args_select_playlist_item() {
        let info = YtdlpInfo::new(json!({
            "id": "98765",
            "title": "t",
            "ext": "mp3",
            "timestamp": 1_700_000_000,
            "duration": 60,
            "playlist_index": 3,
        }));
        let download = handler()
            .extract_download_metadata("f1", &info, None, &[])
            .await
            .unwrap();
        let args = handler().prepare_media_download_args(YtdlpArgs::default(), &download);
        let rendered = args.to_vec();
        assert!(rendered.contains(&"--playlist-items".to_string()));
        assert!(rendered.contains(&"3".to_string()));
        assert!(rendered.contains(&"--referer".to_string()));
    }
}
