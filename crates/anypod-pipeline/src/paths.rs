//! File system paths and public URLs for feeds and their files
//!
//! Single source of truth for the 1:1 mapping between network paths and
//! disk paths. Directory-returning methods create the directory on demand.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::PipelineError;

/// Resolves `(feed_id, download_id, ext)` to canonical paths and URLs under
/// the data root.
#[derive(Debug, Clone)]
pub struct PathManager {
    base_data_dir: PathBuf,
    base_url: String,
}

impl PathManager {
    #[must_use]
    pub fn new(base_data_dir: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            base_data_dir: base_data_dir.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Directory for permanent media files.
    #[must_use]
    pub fn base_media_dir(&self) -> PathBuf {
        self.base_data_dir.join("media")
    }

    /// Directory for temporary downloads.
    #[must_use]
    pub fn base_tmp_dir(&self) -> PathBuf {
        self.base_data_dir.join("tmp")
    }

    /// Directory for hosted image files.
    #[must_use]
    pub fn base_images_dir(&self) -> PathBuf {
        self.base_data_dir.join("images")
    }

    /// Directory for persisted RSS XML files.
    #[must_use]
    pub fn base_feeds_dir(&self) -> PathBuf {
        self.base_data_dir.join("feeds")
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn ensure_dir(&self, path: PathBuf) -> Result<PathBuf, PipelineError> {
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|err| PipelineError::file(path.clone(), err))?;
        Ok(path)
    }

    /// Directory containing the database file, created on demand.
    ///
    /// # Errors
    /// Returns `PipelineError::FileOperation` when creation fails
    pub async fn db_dir(&self) -> Result<PathBuf, PipelineError> {
        self.ensure_dir(self.base_data_dir.join("db")).await
    }

    /// A feed's media directory, created on demand.
    ///
    /// # Errors
    /// Returns `PipelineError::FileOperation` when creation fails
    pub async fn feed_media_dir(&self, feed_id: &str) -> Result<PathBuf, PipelineError> {
        self.ensure_dir(self.base_media_dir().join(feed_id)).await
    }

    /// A feed's temporary directory, created on demand.
    ///
    /// # Errors
    /// Returns `PipelineError::FileOperation` when creation fails
    pub async fn feed_tmp_dir(&self, feed_id: &str) -> Result<PathBuf, PipelineError> {
        self.ensure_dir(self.base_tmp_dir().join(feed_id)).await
    }

    /// A feed's images directory, created on demand.
    ///
    /// # Errors
    /// Returns `PipelineError::FileOperation` when creation fails
    pub async fn feed_images_dir(&self, feed_id: &str) -> Result<PathBuf, PipelineError> {
        self.ensure_dir(self.base_images_dir().join(feed_id)).await
    }

    /// A feed's per-download images directory, created on demand.
    ///
    /// # Errors
    /// Returns `PipelineError::FileOperation` when creation fails
    pub async fn download_images_dir(&self, feed_id: &str) -> Result<PathBuf, PipelineError> {
        let dir = self.feed_images_dir(feed_id).await?.join("downloads");
        self.ensure_dir(dir).await
    }

    /// A fresh scratch file path inside the feed's tmp directory.
    ///
    /// # Errors
    /// Returns `PipelineError::FileOperation` when the directory cannot be created
    pub async fn tmp_file(&self, feed_id: &str) -> Result<PathBuf, PipelineError> {
        let dir = self.feed_tmp_dir(feed_id).await?;
        Ok(dir.join(format!("tmp_{}", Uuid::new_v4().simple())))
    }

    /// Full path to a feed's RSS XML file; the feeds directory is created on
    /// demand.
    ///
    /// # Errors
    /// Returns `PipelineError::FileOperation` when creation fails
    pub async fn feed_xml_path(&self, feed_id: &str) -> Result<PathBuf, PipelineError> {
        let dir = self.ensure_dir(self.base_feeds_dir()).await?;
        Ok(dir.join(format!("{feed_id}.xml")))
    }

    /// Full path to a downloaded media file.
    #[must_use]
    pub fn media_file_path(&self, feed_id: &str, download_id: &str, ext: &str) -> PathBuf {
        self.base_media_dir()
            .join(feed_id)
            .join(format!("{download_id}.{ext}"))
    }

    /// Full path to a hosted image: feed-level when `download_id` is `None`,
    /// per-download otherwise.
    #[must_use]
    pub fn image_path(&self, feed_id: &str, download_id: Option<&str>, ext: &str) -> PathBuf {
        match download_id {
            None => self.base_images_dir().join(format!("{feed_id}.{ext}")),
            Some(download_id) => self
                .base_images_dir()
                .join(feed_id)
                .join("downloads")
                .join(format!("{download_id}.{ext}")),
        }
    }

    /// Public URL for a feed's RSS XML.
    #[must_use]
    pub fn feed_url(&self, feed_id: &str) -> String {
        format!("{}/feeds/{feed_id}.xml", self.base_url)
    }

    /// Public URL for a media file.
    #[must_use]
    pub fn media_file_url(&self, feed_id: &str, download_id: &str, ext: &str) -> String {
        format!("{}/media/{feed_id}/{download_id}.{ext}", self.base_url)
    }

    /// Public URL for a hosted image.
    #[must_use]
    pub fn image_url(&self, feed_id: &str, download_id: Option<&str>, ext: &str) -> String {
        match download_id {
            None => format!("{}/images/{feed_id}.{ext}", self.base_url),
            Some(download_id) => {
                format!(
                    "{}/images/{feed_id}/downloads/{download_id}.{ext}",
                    self.base_url
                )
            }
        }
    }

    /// Root of the data directory (used for diagnostics only).
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.base_data_dir
    }
}
