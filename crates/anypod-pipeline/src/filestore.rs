//! Media file storage under the data root
//!
//! Writes go through an `.incomplete` staging name and a final rename so a
//! file is visible under its real name only once complete.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::paths::PathManager;
use crate::PipelineError;

/// Atomic writes, deletes, existence checks, and reads for media and image
/// files.
#[derive(Debug, Clone)]
pub struct FileStore {
    paths: PathManager,
}

impl FileStore {
    #[must_use]
    pub const fn new(paths: PathManager) -> Self {
        Self { paths }
    }

    /// Move a finished download from its temporary location to the final
    /// media path, atomically.
    ///
    /// A same-filesystem rename is attempted first; cross-device moves fall
    /// back to copy-into-`.incomplete` plus rename.
    ///
    /// # Errors
    /// Returns `PipelineError::FileOperation` on any filesystem failure
    pub async fn persist_media_file(
        &self,
        feed_id: &str,
        download_id: &str,
        ext: &str,
        source: &Path,
    ) -> Result<PathBuf, PipelineError> {
        let final_dir = self.paths.feed_media_dir(feed_id).await?;
        let final_path = final_dir.join(format!("{download_id}.{ext}"));

        match fs::rename(source, &final_path).await {
            Ok(()) => Ok(final_path),
            Err(_) => {
                let incomplete = final_dir.join(format!("{download_id}.{ext}.incomplete"));
                let copy_result = fs::copy(source, &incomplete).await;
                if let Err(err) = copy_result {
                    let _ = fs::remove_file(&incomplete).await;
                    return Err(PipelineError::file(incomplete, err));
                }
                fs::rename(&incomplete, &final_path)
                    .await
                    .map_err(|err| PipelineError::file(final_path.clone(), err))?;
                let _ = fs::remove_file(source).await;
                Ok(final_path)
            }
        }
    }

    /// Write bytes to a path atomically via the `.incomplete` staging name.
    ///
    /// # Errors
    /// Returns `PipelineError::FileOperation` on any filesystem failure
    pub async fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), PipelineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| PipelineError::file(parent.to_path_buf(), err))?;
        }
        let incomplete = Self::incomplete_name(path);

        let write_result: std::io::Result<()> = async {
            let mut file = fs::File::create(&incomplete).await?;
            file.write_all(data).await?;
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(err) = write_result {
            let _ = fs::remove_file(&incomplete).await;
            return Err(PipelineError::file(incomplete, err));
        }

        fs::rename(&incomplete, path)
            .await
            .map_err(|err| PipelineError::file(path.to_path_buf(), err))
    }

    /// Delete a media file. Returns false when the file was already absent.
    ///
    /// # Errors
    /// Returns `PipelineError::FileOperation` on OS errors other than not-found
    pub async fn delete_media_file(
        &self,
        feed_id: &str,
        download_id: &str,
        ext: &str,
    ) -> Result<bool, PipelineError> {
        let path = self.paths.media_file_path(feed_id, download_id, ext);
        Self::delete_file(&path).await
    }

    /// Delete a hosted image. Returns false when the file was already absent.
    ///
    /// # Errors
    /// Returns `PipelineError::FileOperation` on OS errors other than not-found
    pub async fn delete_image(
        &self,
        feed_id: &str,
        download_id: Option<&str>,
        ext: &str,
    ) -> Result<bool, PipelineError> {
        let path = self.paths.image_path(feed_id, download_id, ext);
        Self::delete_file(&path).await
    }

    /// Delete a feed's RSS XML file. Returns false when absent.
    ///
    /// # Errors
    /// Returns `PipelineError::FileOperation` on OS errors other than not-found
    pub async fn delete_feed_xml(&self, feed_id: &str) -> Result<bool, PipelineError> {
        let path = self.paths.base_feeds_dir().join(format!("{feed_id}.xml"));
        Self::delete_file(&path).await
    }

    async fn delete_file(path: &Path) -> Result<bool, PipelineError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(PipelineError::file(path.to_path_buf(), err)),
        }
    }

    /// Whether a media file exists under its final name.
    ///
    /// # Errors
    /// Returns `PipelineError::FileOperation` on OS errors
    pub async fn media_file_exists(
        &self,
        feed_id: &str,
        download_id: &str,
        ext: &str,
    ) -> Result<bool, PipelineError> {
        let path = self.paths.media_file_path(feed_id, download_id, ext);
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(PipelineError::file(path, err)),
        }
    }

    fn incomplete_name(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".incomplete");
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> FileStore {
        FileStore::new(PathManager::new(dir, "http://localhost:8024"))
    }

    #[tokio::test]
    async fn write_atomic_leaves_no_incomplete_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let target = dir.path().join("feeds").join("f1.xml");

        store.write_atomic(&target, b"<rss/>").await.unwrap();

        assert_eq!(fs::read(&target).await.unwrap(), b"<rss/>");
        assert!(fs::metadata(FileStore::incomplete_name(&target)).await.is_err());
    }

    #[tokio::test]
    async fn persist_media_file_moves_from_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let tmp = dir.path().join("tmp_media");
        fs::write(&tmp, b"media-bytes").await.unwrap();

        let final_path = store
            .persist_media_file("f1", "v1", "mp4", &tmp)
            .await
            .unwrap();
        assert_eq!(final_path, dir.path().join("media/f1/v1.mp4"));
        assert_eq!(fs::read(&final_path).await.unwrap(), b"media-bytes");
        assert!(fs::metadata(&tmp).await.is_err());
        assert!(store.media_file_exists("f1", "v1", "mp4").await.unwrap());
    }

    #[tokio::test]
    async fn delete_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(!store.delete_media_file("f1", "nope", "mp4").await.unwrap());
    }
}
