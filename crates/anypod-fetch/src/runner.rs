//! yt-dlp subprocess execution and JSON decoding

use serde_json::Value;

use crate::args::YtdlpArgs;
use crate::info::YtdlpInfo;
use crate::process::{ProcessScope, run_captured};
use crate::FetchError;

const YT_DLP_BIN: &str = "yt-dlp";

/// yt-dlp exits 101 when a break-filter (e.g. `--break-match-filters`) stops
/// enumeration early; output produced up to that point is valid.
const EXIT_BREAK_FILTER: i32 = 101;

/// Captured output of one subprocess run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Executes yt-dlp and decodes its JSON output.
#[derive(Debug, Clone)]
pub struct YtdlpRunner {
    scope: ProcessScope,
}

impl YtdlpRunner {
    #[must_use]
    pub const fn new(scope: ProcessScope) -> Self {
        Self { scope }
    }

    async fn exec(&self, args: &YtdlpArgs, url: &str) -> Result<RunOutput, FetchError> {
        let mut argv = args.to_vec();
        argv.push(url.to_string());
        tracing::debug!(?argv, "running yt-dlp");

        run_captured(&self.scope, YT_DLP_BIN, &argv)
            .await
            .map_err(|err| match err {
                FetchError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                    FetchError::YtdlpNotFound
                }
                other => other,
            })
    }

    /// Extract playlist-level metadata as a single JSON document.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::YtdlpApi` on non-zero exit, empty output, or
    /// unparsable JSON
    pub async fn extract_playlist_info(
        &self,
        args: YtdlpArgs,
        url: &str,
    ) -> Result<(YtdlpInfo, RunOutput), FetchError> {
        let args = args.quiet().no_warnings().dump_single_json().skip_download();
        let output = self.exec(&args, url).await?;

        if output.exit_code != Some(0) {
            return Err(FetchError::YtdlpApi {
                url: url.to_string(),
                message: format!(
                    "yt-dlp completed with error {:?}: {}",
                    output.exit_code, output.stderr
                ),
            });
        }
        if output.stdout.trim().is_empty() {
            return Err(FetchError::YtdlpApi {
                url: url.to_string(),
                message: "yt-dlp did not produce any output".to_string(),
            });
        }

        let value: Value =
            serde_json::from_str(&output.stdout).map_err(|err| FetchError::YtdlpApi {
                url: url.to_string(),
                message: format!("failed to parse yt-dlp JSON output: {err}"),
            })?;
        Ok((YtdlpInfo::new(value), output))
    }

    /// Extract per-item metadata, one JSON document per line.
    ///
    /// Unparsable lines are logged and skipped; a break-filter exit is
    /// treated as success.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::YtdlpApi` on other non-zero exits
    pub async fn extract_downloads_info(
        &self,
        args: YtdlpArgs,
        url: &str,
    ) -> Result<(Vec<YtdlpInfo>, RunOutput), FetchError> {
        let args = args.quiet().no_warnings().dump_json().skip_download();
        let output = self.exec(&args, url).await?;

        match output.exit_code {
            Some(0) | Some(EXIT_BREAK_FILTER) => {}
            code => {
                return Err(FetchError::YtdlpApi {
                    url: url.to_string(),
                    message: format!(
                        "yt-dlp completed with error {code:?}: {}",
                        output.stderr
                    ),
                });
            }
        }

        let mut entries = Vec::new();
        for line in output.stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(value) => entries.push(YtdlpInfo::new(value)),
                Err(err) => {
                    tracing::warn!(%err, "failed to parse yt-dlp JSON line, skipping");
                }
            }
        }
        Ok((entries, output))
    }

    /// Download media for a URL; the target location comes from the args'
    /// path configuration.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::YtdlpApi` on non-zero exit
    pub async fn download(&self, args: YtdlpArgs, url: &str) -> Result<RunOutput, FetchError> {
        let args = args.quiet().no_warnings();
        let output = self.exec(&args, url).await?;

        if output.exit_code != Some(0) {
            return Err(FetchError::YtdlpApi {
                url: url.to_string(),
                message: format!(
                    "download failed with exit code {:?}: {}",
                    output.exit_code, output.stderr
                ),
            });
        }
        Ok(output)
    }

    /// Run `yt-dlp --update-to <channel> --version` to self-update the
    /// binary. Failures are reported but callers treat them as advisory.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::YtdlpApi` on non-zero exit
    pub async fn self_update(&self, channel: &str) -> Result<(), FetchError> {
        let argv = vec![
            "--update-to".to_string(),
            channel.to_string(),
            "--version".to_string(),
        ];
        let output = run_captured(&self.scope, YT_DLP_BIN, &argv)
            .await
            .map_err(|err| match err {
                FetchError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                    FetchError::YtdlpNotFound
                }
                other => other,
            })?;
        if output.exit_code != Some(0) {
            return Err(FetchError::YtdlpApi {
                url: "<self-update>".to_string(),
                message: output.stderr,
            });
        }
        tracing::info!(channel, version = output.stdout.trim(), "yt-dlp self-update ran");
        Ok(())
    }
}
