//! Thin async wrapper around ffprobe for media probing

use std::path::Path;

use serde_json::Value;

use crate::process::{ProcessScope, run_captured};
use crate::FetchError;

const FFPROBE_BIN: &str = "ffprobe";

/// Runs ffprobe commands to gather media metadata.
#[derive(Debug, Clone)]
pub struct FfProbe {
    scope: ProcessScope,
}

impl FfProbe {
    #[must_use]
    pub const fn new(scope: ProcessScope) -> Self {
        Self { scope }
    }

    async fn run(&self, args: Vec<String>) -> Result<(i32, String, String), FetchError> {
        let output = run_captured(&self.scope, FFPROBE_BIN, &args)
            .await
            .map_err(|err| match err {
                FetchError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                    FetchError::FfProbe {
                        message: "ffprobe executable not found".to_string(),
                        stderr: None,
                    }
                }
                other => other,
            })?;
        Ok((
            output.exit_code.unwrap_or(-1),
            output.stdout,
            output.stderr,
        ))
    }

    /// Return true when the file's first stream is MJPEG (i.e. a JPG).
    ///
    /// # Errors
    ///
    /// Returns `FetchError::FfProbe` on probe failure or unparsable output
    pub async fn is_jpg_file(&self, file_path: &Path) -> Result<bool, FetchError> {
        let (code, stdout, stderr) = self
            .run(vec![
                "-v".into(),
                "quiet".into(),
                "-print_format".into(),
                "json".into(),
                "-show_streams".into(),
                file_path.display().to_string(),
            ])
            .await?;
        if code != 0 {
            return Err(FetchError::FfProbe {
                message: "ffprobe failed (is_jpg_file)".to_string(),
                stderr: Some(stderr),
            });
        }

        let data: Value = serde_json::from_str(&stdout).map_err(|err| FetchError::FfProbe {
            message: format!("failed to parse ffprobe JSON output: {err}"),
            stderr: Some(stdout.clone()),
        })?;
        let codec = data
            .get("streams")
            .and_then(Value::as_array)
            .and_then(|streams| streams.first())
            .and_then(|stream| stream.get("codec_name"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(codec.eq_ignore_ascii_case("mjpeg"))
    }

    async fn duration_seconds(
        &self,
        probe_target: &str,
        headers: &[(&str, &str)],
    ) -> Result<i64, FetchError> {
        let mut args: Vec<String> = vec![
            "-v".into(),
            "error".into(),
            "-show_entries".into(),
            "format=duration".into(),
            "-of".into(),
            "default=noprint_wrappers=1:nokey=1".into(),
        ];
        for (name, value) in headers {
            args.push("-headers".into());
            args.push(format!("{name}: {value}"));
        }
        args.push(probe_target.to_string());

        let (code, stdout, stderr) = self.run(args).await?;
        if code != 0 {
            return Err(FetchError::FfProbe {
                message: "ffprobe failed (duration)".to_string(),
                stderr: Some(stderr),
            });
        }
        let text = stdout.trim();
        if text.is_empty() {
            return Err(FetchError::FfProbe {
                message: "ffprobe returned empty duration output".to_string(),
                stderr: Some(stderr),
            });
        }
        text.parse::<f64>()
            .map(|f| {
                #[expect(clippy::cast_possible_truncation)]
                let secs = f as i64;
                secs
            })
            .map_err(|_| FetchError::FfProbe {
                message: "failed to parse duration output".to_string(),
                stderr: Some(text.to_string()),
            })
    }

    /// Media duration in seconds from a local file.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::FfProbe` on failure
    pub async fn duration_from_file(&self, file_path: &Path) -> Result<i64, FetchError> {
        self.duration_seconds(&file_path.display().to_string(), &[])
            .await
    }

    /// Media duration in seconds probed from a remote URL, with optional
    /// HTTP headers (e.g. a referer).
    ///
    /// # Errors
    ///
    /// Returns `FetchError::FfProbe` on failure
    pub async fn duration_from_url(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<i64, FetchError> {
        self.duration_seconds(url, headers).await
    }
}
