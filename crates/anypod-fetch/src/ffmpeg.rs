//! Thin async wrapper around ffmpeg for simple media conversions

use std::path::Path;

use crate::process::{ProcessScope, run_captured};
use crate::FetchError;

const FFMPEG_BIN: &str = "ffmpeg";

/// Runs ffmpeg commands for the conversions this codebase needs.
#[derive(Debug, Clone)]
pub struct FfMpeg {
    scope: ProcessScope,
}

impl FfMpeg {
    #[must_use]
    pub const fn new(scope: ProcessScope) -> Self {
        Self { scope }
    }

    /// Convert an image file to JPG using the MJPEG encoder.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::FfMpeg` when conversion fails
    pub async fn convert_image_to_jpg(
        &self,
        input_path: &Path,
        output_path: &Path,
    ) -> Result<(), FetchError> {
        let args = vec![
            "-i".to_string(),
            input_path.display().to_string(),
            "-f".to_string(),
            "mjpeg".to_string(),
            "-y".to_string(),
            output_path.display().to_string(),
        ];
        let output = run_captured(&self.scope, FFMPEG_BIN, &args)
            .await
            .map_err(|err| match err {
                FetchError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                    FetchError::FfMpeg {
                        message: "ffmpeg executable not found".to_string(),
                        stderr: None,
                    }
                }
                other => other,
            })?;
        if output.exit_code != Some(0) {
            return Err(FetchError::FfMpeg {
                message: "image conversion to JPG failed".to_string(),
                stderr: Some(output.stderr),
            });
        }
        Ok(())
    }
}
