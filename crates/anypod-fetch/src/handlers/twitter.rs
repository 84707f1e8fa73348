//! Twitter/X-specific handler
//!
//! Status posts are always single videos; there is no playlist or live
//! concept to handle.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use anypod_core::{Download, DownloadStatus, SourceType, TranscriptSource};

use super::{DiscoveredFeedMetadata, SourceHandler};
use crate::args::YtdlpArgs;
use crate::info::YtdlpInfo;
use crate::runner::YtdlpRunner;
use crate::{mime_type_for_ext, FetchError};

const HANDLER: &str = "Twitter";

fn data_error(feed_id: &str, download_id: &str, message: impl Into<String>) -> FetchError {
    FetchError::YtdlpData {
        handler: HANDLER,
        feed_id: feed_id.to_string(),
        download_id: download_id.to_string(),
        message: message.into(),
    }
}

struct TwitterEntry<'a> {
    info: &'a YtdlpInfo,
    feed_id: &'a str,
    download_id: String,
}

impl<'a> TwitterEntry<'a> {
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
        if let Some(ts) = self
            .info
            .get_i64("timestamp")
            .map_err(|e| self.err(e.to_string()))?
        {
            return DateTime::from_timestamp(ts, 0)
                .map(Some)
                .ok_or_else(|| self.err(format!("invalid timestamp: '{ts}'")));
        }
        if let Some(date) = self.str_field("upload_date")? {
            let parsed = NaiveDate::parse_from_str(date, "%Y%m%d")
                .map_err(|_| self.err(format!("invalid upload date: '{date}'")))?;
            return Ok(parsed.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc()));
        }
        Ok(None)
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
        Ok(size.unwrap_or(anypod_core::UPCOMING_SENTINEL))
    }

    fn thumbnail(&self) -> Result<Option<String>, FetchError> {
        if let Some(thumbnails) = self.info.thumbnails() {
            if let Some(best) = thumbnails.best_supported() {
                return Ok(best.url.clone());
            }
        }
        Ok(self.str_field("thumbnail")?.map(String::from))
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
        Ok(if parts.is_empty() {
            None
        } else {
            Some(parts.join(" | "))
        })
    }
}

/// Twitter/X implementation of the source handler protocol.
pub struct TwitterHandler;

#[async_trait]
impl SourceHandler for TwitterHandler {
    async fn determine_fetch_strategy(
        &self,
        feed_id: &str,
        initial_url: &str,
        base_args: YtdlpArgs,
        runner: &YtdlpRunner,
    ) -> Result<(Option<String>, SourceType), FetchError> {
        let discovery_args = base_args.skip_download().flat_playlist();
        let (info, _) = runner.extract_playlist_info(discovery_args, initial_url).await?;

        let entry = TwitterEntry::new(&info, feed_id)?;
        let fetch_url = entry.str_field("webpage_url")?.map(String::from);
        let extractor = entry.str_field("extractor")?.map(str::to_lowercase);

        if extractor.as_deref() == Some("twitter") {
            return Ok((fetch_url, SourceType::SingleVideo));
        }

        tracing::warn!(
            feed_id,
            extractor = extractor.as_deref().unwrap_or("<unknown>"),
            "unhandled Twitter URL classification, defaulting to unknown"
        );
        Ok((fetch_url, SourceType::Unknown))
    }

    fn extract_feed_metadata(
        &self,
        feed_id: &str,
        info: &YtdlpInfo,
    ) -> Result<DiscoveredFeedMetadata, FetchError> {
        let entry = TwitterEntry::new(info, feed_id)?;
        Ok(DiscoveredFeedMetadata {
            title: entry.str_field("title")?.map(String::from),
            description: entry.str_field("description")?.map(String::from),
            author: entry.str_field("uploader")?.map(String::from),
            remote_image_url: entry.thumbnail()?,
        })
    }

    async fn extract_download_metadata(
        &self,
        feed_id: &str,
        info: &YtdlpInfo,
        _transcript_lang: Option<&str>,
        _transcript_source_priority: &[TranscriptSource],
    ) -> Result<Download, FetchError> {
        let entry = TwitterEntry::new(info, feed_id)?;

        let Some(ext) = entry.str_field("ext")? else {
            return Err(FetchError::FilteredOut {
                feed_id: feed_id.to_string(),
                download_id: entry.download_id,
            });
        };
        let ext = ext.to_string();
        let mime_type = mime_type_for_ext(&ext).map_err(|e| entry.err(e.to_string()))?;

        let source_url = entry
            .str_field("webpage_url")?
            .or(entry.str_field("original_url")?)
            .map(String::from)
            .or_else(|| {
                entry
                    .str_field("uploader_id")
                    .ok()
                    .flatten()
                    .map(|handle| {
                        format!("https://x.com/{handle}/status/{}", entry.download_id)
                    })
            })
            .ok_or_else(|| entry.err("missing source URL"))?;

        let published = entry
            .published()?
            .ok_or_else(|| entry.err("missing published datetime"))?;

        let duration = info
            .duration_seconds()
            .map_err(|e| entry.err(e.to_string()))?
            .ok_or_else(|| entry.err("missing duration"))?;

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
            playlist_index: None,
            transcript_ext: None,
            transcript_lang: None,
            transcript_source: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn parses_status_post() {
        let info = YtdlpInfo::new(json!({
            "id": "1234567890",
            "title": "a post",
            "uploader_id": "someuser",
            "ext": "mp4",
            "timestamp": 1_700_000_000,
            "duration": 45,
            "height": 720,
        }));

        let download = TwitterHandler
            .extract_download_metadata("f1", &info, None, &[])
            .await
            .unwrap();
        assert_eq!(download.status, DownloadStatus::Queued);
        assert_eq!(
            download.source_url,
            "https://x.com/someuser/status/1234567890"
        );
        assert_eq!(download.quality_info.as_deref(), Some("720p"));
    }
}
