//! Image downloading for feed and download thumbnails
//!
//! Images are fetched over HTTP with retry, normalized to JPG (ffprobe
//! check, ffmpeg convert), and stored in the images tree.

use std::path::Path;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use anypod_fetch::{FfMpeg, FfProbe};

use crate::paths::PathManager;
use crate::PipelineError;

/// Downloads and hosts images, always as JPG.
pub struct ImageDownloader {
    paths: PathManager,
    client: reqwest::Client,
    ffprobe: FfProbe,
    ffmpeg: FfMpeg,
}

impl ImageDownloader {
    #[must_use]
    pub fn new(paths: PathManager, ffprobe: FfProbe, ffmpeg: FfMpeg) -> Self {
        Self {
            paths,
            client: reqwest::Client::new(),
            ffprobe,
            ffmpeg,
        }
    }

    fn image_error(
        feed_id: &str,
        url: &str,
        message: impl Into<String>,
    ) -> PipelineError {
        PipelineError::ImageDownload {
            feed_id: feed_id.to_string(),
            url: url.to_string(),
            message: message.into(),
        }
    }

    /// Download an image and host it as JPG.
    ///
    /// `download_id = None` stores the feed image
    /// (`images/<feed_id>.jpg`); otherwise the per-download thumbnail
    /// (`images/<feed_id>/downloads/<download_id>.jpg`). Returns the hosted
    /// extension.
    ///
    /// # Errors
    /// Returns `PipelineError::ImageDownload` on fetch, probe, convert, or
    /// store failure
    pub async fn download_image(
        &self,
        feed_id: &str,
        download_id: Option<&str>,
        url: &str,
    ) -> Result<String, PipelineError> {
        let final_path = self.paths.image_path(feed_id, download_id, "jpg");
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| PipelineError::file(parent.to_path_buf(), err))?;
        }
        let tmp_path = self.paths.tmp_file(feed_id).await?;

        let fetch = || async { self.fetch_bytes(url).await };
        let bytes = fetch
            .retry(
                ExponentialBuilder::default()
                    .with_max_times(3)
                    .with_min_delay(Duration::from_secs(1))
                    .with_max_delay(Duration::from_secs(10)),
            )
            .when(is_retryable_error)
            .notify(|err, dur| {
                tracing::warn!(url, ?dur, %err, "image download failed, retrying");
            })
            .await
            .map_err(|err| Self::image_error(feed_id, url, err.to_string()))?;

        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|err| Self::image_error(feed_id, url, err.to_string()))?;

        let result = self
            .normalize_to_jpg(feed_id, url, &tmp_path, &final_path)
            .await;

        if tokio::fs::metadata(&tmp_path).await.is_ok() {
            if let Err(err) = tokio::fs::remove_file(&tmp_path).await {
                tracing::warn!(feed_id, path = %tmp_path.display(), %err, "failed to clean up temporary image file");
            }
        }

        result.map(|()| "jpg".to_string())
    }

    async fn normalize_to_jpg(
        &self,
        feed_id: &str,
        url: &str,
        tmp_path: &Path,
        final_path: &Path,
    ) -> Result<(), PipelineError> {
        let is_jpg = self
            .ffprobe
            .is_jpg_file(tmp_path)
            .await
            .map_err(|err| Self::image_error(feed_id, url, format!("format detection failed: {err}")))?;

        if is_jpg {
            tokio::fs::rename(tmp_path, final_path)
                .await
                .map_err(|err| Self::image_error(feed_id, url, err.to_string()))
        } else {
            self.ffmpeg
                .convert_image_to_jpg(tmp_path, final_path)
                .await
                .map_err(|err| Self::image_error(feed_id, url, err.to_string()))
        }
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, reqwest::Error> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Retry on network trouble and server-side failures, not on 4xx.
fn is_retryable_error(err: &reqwest::Error) -> bool {
    if err.is_connect() || err.is_timeout() {
        return true;
    }
    err.status()
        .is_some_and(|status| status.is_server_error() || status.as_u16() == 429)
}
