//! YouTube-specific handler
//!
//! Covers single videos, playlists, channel tabs, and the main-channel-page
//! heuristic (a playlist whose entries are all playlists represents the tab
//! list of a channel; the Videos tab is what we actually want to enumerate).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use anypod_core::{
    Download, DownloadStatus, SourceType, TranscriptSource, UPCOMING_EXT, UPCOMING_MIME,
    UPCOMING_SENTINEL,
};

use super::{DiscoveredFeedMetadata, SourceHandler};
use crate::args::YtdlpArgs;
use crate::info::YtdlpInfo;
use crate::runner::YtdlpRunner;
use crate::{mime_type_for_ext, FetchError};

const HANDLER: &str = "YouTube";

const CHANNEL_TABS: &[&str] = &[
    "/videos",
    "/shorts",
    "/streams",
    "/playlists",
    "/community",
    "/channels",
    "/about",
];

fn data_error(feed_id: &str, download_id: &str, message: impl Into<String>) -> FetchError {
    FetchError::YtdlpData {
        handler: HANDLER,
        feed_id: feed_id.to_string(),
        download_id: download_id.to_string(),
        message: message.into(),
    }
}

/// Typed access to one YouTube entry.
struct YoutubeEntry<'a> {
    info: &'a YtdlpInfo,
    feed_id: &'a str,
    download_id: String,
}

impl<'a> YoutubeEntry<'a> {
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

    fn webpage_url(&self) -> Result<Option<&str>, FetchError> {
        self.info.get_str("webpage_url").map_err(|e| self.err(e.to_string()))
    }

    fn extractor(&self) -> Result<Option<String>, FetchError> {
        Ok(self
            .info
            .get_str("extractor")
            .map_err(|e| self.err(e.to_string()))?
            .map(str::to_lowercase))
    }

    fn entry_type(&self) -> Result<Option<&str>, FetchError> {
        self.info.get_str("_type").map_err(|e| self.err(e.to_string()))
    }

    fn title(&self) -> Result<&str, FetchError> {
        let title = self
            .info
            .req_str("title")
            .map_err(|e| self.err(e.to_string()))?;
        if title == "[Deleted video]" || title == "[Private video]" {
            return Err(self.err(format!("video unavailable or deleted (title: '{title}')")));
        }
        Ok(title)
    }

    fn ext(&self) -> Result<Option<&str>, FetchError> {
        self.info.get_str("ext").map_err(|e| self.err(e.to_string()))
    }

    fn filesize(&self) -> Result<i64, FetchError> {
        let size = self
            .info
            .get_i64("filesize")
            .map_err(|e| self.err(e.to_string()))?
            .filter(|s| *s > 0)
            .or(self
                .info
                .get_i64("filesize_approx")
                .map_err(|e| self.err(e.to_string()))?
                .filter(|s| *s > 0));
        Ok(size.unwrap_or_else(|| {
            tracing::warn!(
                feed_id = self.feed_id,
                download_id = self.download_id,
                "metadata missing filesize, using placeholder"
            );
            UPCOMING_SENTINEL
        }))
    }

    fn published(&self) -> Result<Option<DateTime<Utc>>, FetchError> {
        if let Some(ts) = self
            .info
            .get_i64("timestamp")
            .map_err(|e| self.err(e.to_string()))?
        {
            return DateTime::from_timestamp(ts, 0)
                .map(Some)
                .ok_or_else(|| self.err(format!("invalid timestamp: '{ts}'")));
        }
        if let Some(date) = self
            .info
            .get_str("upload_date")
            .map_err(|e| self.err(e.to_string()))?
        {
            let parsed = NaiveDate::parse_from_str(date, "%Y%m%d")
                .map_err(|_| self.err(format!("invalid upload date: '{date}'")))?;
            return Ok(parsed.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc()));
        }
        if let Some(ts) = self
            .info
            .get_i64("release_timestamp")
            .map_err(|e| self.err(e.to_string()))?
        {
            return DateTime::from_timestamp(ts, 0)
                .map(Some)
                .ok_or_else(|| self.err(format!("invalid release timestamp: '{ts}'")));
        }
        Ok(None)
    }

    fn is_upcoming(&self) -> Result<bool, FetchError> {
        let is_live = self
            .info
            .get_bool("is_live")
            .map_err(|e| self.err(e.to_string()))?
            .unwrap_or(false);
        let live_status = self
            .info
            .get_str("live_status")
            .map_err(|e| self.err(e.to_string()))?;
        Ok(is_live || live_status == Some("is_upcoming"))
    }

    fn thumbnail(&self) -> Result<Option<String>, FetchError> {
        if let Some(thumbnails) = self.info.thumbnails() {
            if thumbnails.is_empty() {
                return Ok(self
                    .info
                    .get_str("thumbnail")
                    .map_err(|e| self.err(e.to_string()))?
                    .map(String::from));
            }
            let Some(best) = thumbnails.best_supported() else {
                tracing::warn!(
                    feed_id = self.feed_id,
                    download_id = self.download_id,
                    "no JPG or PNG thumbnails available, skipping thumbnail"
                );
                return Ok(None);
            };
            return Ok(best.url.clone());
        }
        Ok(self
            .info
            .get_str("thumbnail")
            .map_err(|e| self.err(e.to_string()))?
            .map(String::from))
    }

    fn description(&self) -> Result<Option<&str>, FetchError> {
        self.info
            .get_str("description")
            .map_err(|e| self.err(e.to_string()))
    }

    /// Resolution / fps / HDR / codec summary for display.
    fn quality_info(&self) -> Result<Option<String>, FetchError> {
        let mut parts: Vec<String> = Vec::new();

        if let Some(resolution) = self
            .info
            .get_str("resolution")
            .map_err(|e| self.err(e.to_string()))?
        {
            parts.push(resolution.to_string());
        } else if let Some(height) = self
            .info
            .get_i64("height")
            .map_err(|e| self.err(e.to_string()))?
        {
            match self
                .info
                .get_i64("width")
                .map_err(|e| self.err(e.to_string()))?
            {
                Some(width) => parts.push(format!("{width}x{height}")),
                None => parts.push(format!("{height}p")),
            }
        } else if let Some(note) = self
            .info
            .get_str("format_note")
            .map_err(|e| self.err(e.to_string()))?
        {
            parts.push(note.to_string());
        }

        if let Some(fps) = self
            .info
            .get_i64("fps")
            .map_err(|e| self.err(e.to_string()))?
        {
            if fps != 30 {
                parts.push(format!("{fps}fps"));
            }
        }

        if let Some(range) = self
            .info
            .get_str("dynamic_range")
            .map_err(|e| self.err(e.to_string()))?
        {
            if range != "SDR" {
                parts.push(range.to_string());
            }
        }

        match self
            .info
            .get_str("vcodec")
            .map_err(|e| self.err(e.to_string()))?
        {
            None | Some("none") => {}
            Some(vcodec) if vcodec.starts_with("av01") => parts.push("AV1".to_string()),
            Some(vcodec) if vcodec.starts_with("vp09") || vcodec.starts_with("vp9") => {
                parts.push("VP9".to_string());
            }
            Some(vcodec) if vcodec.starts_with("avc1") || vcodec.starts_with("h264") => {
                parts.push("H.264".to_string());
            }
            Some(vcodec) if vcodec.starts_with("hev1") || vcodec.starts_with("h265") => {
                parts.push("H.265".to_string());
            }
            Some(vcodec) => parts.push(vcodec.to_string()),
        }

        match self
            .info
            .get_str("acodec")
            .map_err(|e| self.err(e.to_string()))?
        {
            None | Some("none") => {}
            Some("opus") => parts.push("Opus".to_string()),
            Some(acodec) if acodec.starts_with("mp4a.40") => parts.push("AAC".to_string()),
            Some("mp3") => parts.push("MP3".to_string()),
            Some(acodec) => parts.push(acodec.to_string()),
        }

        Ok(if parts.is_empty() {
            None
        } else {
            Some(parts.join(" | "))
        })
    }
}

/// Pick a transcript source for `lang` from the subtitle metadata, honoring
/// the configured priority order.
fn resolve_transcript_source(
    info: &YtdlpInfo,
    lang: &str,
    priority: &[TranscriptSource],
) -> Option<TranscriptSource> {
    let has_lang = |field: &str| {
        info.raw(field)
            .and_then(|value| value.as_object())
            .is_some_and(|map| map.contains_key(lang))
    };
    priority.iter().copied().find(|source| match source {
        TranscriptSource::Creator => has_lang("subtitles"),
        TranscriptSource::Auto => has_lang("automatic_captions"),
    })
}

/// Classify a discovery response into a fetchable URL and source type.
///
/// Pure function over the discovery payload so the heuristic is testable
/// without spawning yt-dlp.
fn resolve_strategy(
    feed_id: &str,
    info: &YtdlpInfo,
) -> Result<(Option<String>, SourceType), FetchError> {
    let entry = YoutubeEntry::new(info, feed_id)?;
    let fetch_url = entry.webpage_url()?.map(String::from);
    let extractor = entry.extractor()?;
    let entry_type = entry.entry_type()?;

    if extractor.as_deref() == Some("youtube") {
        return Ok((fetch_url, SourceType::SingleVideo));
    }

    if extractor.as_deref() == Some("youtube:tab") {
        let is_tab_url = fetch_url
            .as_deref()
            .is_some_and(|url| CHANNEL_TABS.iter().any(|tab| url.trim_end_matches('/').ends_with(tab)));

        if fetch_url
            .as_deref()
            .is_some_and(|url| url.trim_end_matches('/').ends_with("/playlists"))
        {
            return Err(data_error(
                feed_id,
                fetch_url.as_deref().unwrap_or("<unknown>"),
                "link is a playlists tab, not a specific playlist; pick a specific list",
            ));
        }

        let entries = info.entries()?;
        let is_main_channel_page = entry_type == Some("playlist")
            && entries.is_some()
            && !is_tab_url
            && entries.as_ref().is_some_and(|entries| {
                entries.is_empty()
                    || entries.iter().all(|e| {
                        e.as_ref().is_some_and(|e| {
                            e.get_str("_type").ok().flatten() == Some("playlist")
                        })
                    })
            });

        if is_main_channel_page {
            if let Some(entries) = entries {
                for tab in entries.into_iter().flatten() {
                    let tab_url = tab.get_str("webpage_url").ok().flatten();
                    if let Some(tab_url) = tab_url {
                        if tab_url.trim_end_matches('/').ends_with("/videos") {
                            return Ok((Some(tab_url.to_string()), SourceType::Channel));
                        }
                    }
                }
            }
            tracing::warn!(
                feed_id,
                "'Videos' tab not found for main channel page, using resolved URL"
            );
            return Ok((fetch_url, SourceType::Channel));
        }

        return Ok((fetch_url, SourceType::Playlist));
    }

    tracing::warn!(
        feed_id,
        extractor = extractor.as_deref().unwrap_or("<unknown>"),
        "unhandled URL classification, defaulting to unknown"
    );
    Ok((fetch_url, SourceType::Unknown))
}

/// YouTube implementation of the source handler protocol. Also the default
/// handler for hosts without a dedicated one.
pub struct YoutubeHandler;

#[async_trait]
impl SourceHandler for YoutubeHandler {
    async fn determine_fetch_strategy(
        &self,
        feed_id: &str,
        initial_url: &str,
        base_args: YtdlpArgs,
        runner: &YtdlpRunner,
    ) -> Result<(Option<String>, SourceType), FetchError> {
        let discovery_args = base_args.skip_download().flat_playlist();
        let (info, _) = runner.extract_playlist_info(discovery_args, initial_url).await?;
        resolve_strategy(feed_id, &info)
    }

    fn extract_feed_metadata(
        &self,
        feed_id: &str,
        info: &YtdlpInfo,
    ) -> Result<DiscoveredFeedMetadata, FetchError> {
        let entry = YoutubeEntry::new(info, feed_id)?;
        let author = info
            .get_str("uploader")
            .map_err(|e| entry.err(e.to_string()))?
            .or(info
                .get_str("channel")
                .map_err(|e| entry.err(e.to_string()))?);
        Ok(DiscoveredFeedMetadata {
            title: Some(entry.title()?.to_string()),
            description: entry.description()?.map(String::from),
            author: author.map(String::from),
            remote_image_url: entry.thumbnail()?,
        })
    }

    async fn extract_download_metadata(
        &self,
        feed_id: &str,
        info: &YtdlpInfo,
        transcript_lang: Option<&str>,
        transcript_source_priority: &[TranscriptSource],
    ) -> Result<Download, FetchError> {
        let entry = YoutubeEntry::new(info, feed_id)?;

        let Some(raw_ext) = entry.ext()? else {
            return Err(FetchError::FilteredOut {
                feed_id: feed_id.to_string(),
                download_id: entry.download_id,
            });
        };
        let raw_ext = raw_ext.to_string();

        let source_url = entry
            .webpage_url()?
            .map(String::from)
            .or(info
                .get_str("original_url")
                .map_err(|e| entry.err(e.to_string()))?
                .map(String::from))
            .unwrap_or_else(|| {
                format!("https://www.youtube.com/watch?v={}", entry.download_id)
            });

        let published = entry
            .published()?
            .ok_or_else(|| entry.err("missing published datetime"))?;

        let status = if entry.is_upcoming()? {
            DownloadStatus::Upcoming
        } else {
            DownloadStatus::Queued
        };

        let (ext, mime_type, duration) = if status == DownloadStatus::Upcoming {
            (
                UPCOMING_EXT.to_string(),
                UPCOMING_MIME.to_string(),
                UPCOMING_SENTINEL,
            )
        } else {
            let duration = info
                .duration_seconds()
                .map_err(|e| entry.err(e.to_string()))?
                .ok_or_else(|| entry.err("missing duration"))?;
            let mime_type = mime_type_for_ext(&raw_ext)
                .map_err(|e| entry.err(e.to_string()))?;
            (raw_ext, mime_type, duration)
        };

        let transcript_source = transcript_lang.and_then(|lang| {
            resolve_transcript_source(info, lang, transcript_source_priority)
        });

        Ok(Download {
            feed_id: feed_id.to_string(),
            id: entry.download_id.clone(),
            source_url,
            title: entry.title()?.to_string(),
            published,
            ext,
            mime_type,
            filesize: entry.filesize()?,
            duration,
            status,
            discovered_at: None,
            updated_at: None,
            downloaded_at: None,
            remote_thumbnail_url: entry.thumbnail()?,
            thumbnail_ext: None,
            description: entry.description()?.map(String::from),
            quality_info: entry.quality_info()?,
            retries: 0,
            last_error: None,
            download_logs: None,
            playlist_index: None,
            transcript_ext: None,
            transcript_lang: transcript_source
                .and(transcript_lang.map(String::from)),
            transcript_source,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn handler() -> YoutubeHandler {
        YoutubeHandler
    }

    #[tokio::test]
    async fn parses_vod_entry() {
        let info = YtdlpInfo::new(json!({
            "id": "abc123",
            "title": "Test Video",
            "webpage_url": "https://www.youtube.com/watch?v=abc123",
            "ext": "mp4",
            "timestamp": 1_700_000_000,
            "duration": 620,
            "filesize": 10_485_760,
            "vcodec": "avc1.640028",
            "acodec": "mp4a.40.2",
            "height": 1080,
            "width": 1920,
        }));

        let download = handler()
            .extract_download_metadata("f1", &info, None, &[])
            .await
            .unwrap();
        assert_eq!(download.id, "abc123");
        assert_eq!(download.status, DownloadStatus::Queued);
        assert_eq!(download.ext, "mp4");
        assert_eq!(download.mime_type, "video/mp4");
        assert_eq!(download.duration, 620);
        assert_eq!(download.quality_info.as_deref(), Some("1920x1080 | H.264 | AAC"));
    }

    #[tokio::test]
    async fn live_entry_gets_upcoming_sentinels() {
        let info = YtdlpInfo::new(json!({
            "id": "live1",
            "title": "Live Stream",
            "webpage_url": "https://www.youtube.com/watch?v=live1",
            "ext": "mp4",
            "timestamp": 1_700_000_000,
            "is_live": true,
        }));

        let download = handler()
            .extract_download_metadata("f1", &info, None, &[])
            .await
            .unwrap();
        assert_eq!(download.status, DownloadStatus::Upcoming);
        assert_eq!(download.ext, UPCOMING_EXT);
        assert_eq!(download.mime_type, UPCOMING_MIME);
        assert_eq!(download.duration, UPCOMING_SENTINEL);
    }

    #[tokio::test]
    async fn missing_ext_means_filtered_out() {
        let info = YtdlpInfo::new(json!({
            "id": "gone",
            "title": "Filtered",
            "timestamp": 1_700_000_000,
        }));
        let err = handler()
            .extract_download_metadata("f1", &info, None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::FilteredOut { .. }));
    }

    #[tokio::test]
    async fn deleted_video_title_is_a_data_error() {
        let info = YtdlpInfo::new(json!({
            "id": "del1",
            "title": "[Deleted video]",
            "ext": "mp4",
            "timestamp": 1_700_000_000,
            "duration": 10,
        }));
        let err = handler()
            .extract_download_metadata("f1", &info, None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::YtdlpData { .. }));
    }

    #[test]
    fn single_video_strategy() {
        let info = YtdlpInfo::new(json!({
            "id": "abc",
            "extractor": "youtube",
            "webpage_url": "https://www.youtube.com/watch?v=abc",
        }));
        let (url, source_type) = resolve_strategy("f1", &info).unwrap();
        assert_eq!(url.as_deref(), Some("https://www.youtube.com/watch?v=abc"));
        assert_eq!(source_type, SourceType::SingleVideo);
    }

    #[test]
    fn main_channel_page_rewrites_to_videos_tab() {
        let info = YtdlpInfo::new(json!({
            "id": "UCabc",
            "extractor": "youtube:tab",
            "_type": "playlist",
            "webpage_url": "https://www.youtube.com/@somechannel",
            "entries": [
                {"id": "t1", "_type": "playlist",
                 "webpage_url": "https://www.youtube.com/@somechannel/videos"},
                {"id": "t2", "_type": "playlist",
                 "webpage_url": "https://www.youtube.com/@somechannel/shorts"},
            ],
        }));
        let (url, source_type) = resolve_strategy("f1", &info).unwrap();
        assert_eq!(
            url.as_deref(),
            Some("https://www.youtube.com/@somechannel/videos")
        );
        assert_eq!(source_type, SourceType::Channel);
    }

    #[test]
    fn playlist_of_videos_is_a_playlist() {
        let info = YtdlpInfo::new(json!({
            "id": "PLxyz",
            "extractor": "youtube:tab",
            "_type": "playlist",
            "webpage_url": "https://www.youtube.com/playlist?list=PLxyz",
            "entries": [
                {"id": "v1", "_type": "url"},
                {"id": "v2", "_type": "url"},
            ],
        }));
        let (_, source_type) = resolve_strategy("f1", &info).unwrap();
        assert_eq!(source_type, SourceType::Playlist);
    }

    #[test]
    fn playlists_tab_is_rejected() {
        let info = YtdlpInfo::new(json!({
            "id": "UCabc",
            "extractor": "youtube:tab",
            "_type": "playlist",
            "webpage_url": "https://www.youtube.com/@somechannel/playlists",
            "entries": [],
        }));
        assert!(resolve_strategy("f1", &info).is_err());
    }

    #[test]
    fn transcript_source_honors_priority() {
        let info = YtdlpInfo::new(json!({
            "id": "abc",
            "subtitles": {"en": []},
            "automatic_captions": {"en": []},
        }));
        assert_eq!(
            resolve_transcript_source(
                &info,
                "en",
                &[TranscriptSource::Creator, TranscriptSource::Auto]
            ),
            Some(TranscriptSource::Creator)
        );

        let auto_only = YtdlpInfo::new(json!({
            "id": "abc",
            "automatic_captions": {"en": []},
        }));
        assert_eq!(
            resolve_transcript_source(
                &auto_only,
                "en",
                &[TranscriptSource::Creator, TranscriptSource::Auto]
            ),
            Some(TranscriptSource::Auto)
        );
        assert_eq!(
            resolve_transcript_source(&auto_only, "de", &[TranscriptSource::Auto]),
            None
        );
    }
}
