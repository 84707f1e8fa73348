//! Runtime configuration
//!
//! Global settings come from the environment (figment: defaults < env);
//! feeds come from a YAML document whose location the `CONFIG_FILE` setting
//! names.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use figment2::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_inline_default::serde_inline_default;

use anypod_core::{PodcastCategories, PodcastExplicit, PodcastType, TranscriptSource};
use anypod_util::is_valid_feed_id;

use crate::PipelineError;

/// Global application settings, sourced from environment variables.
#[serde_inline_default]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log output format ("human" or "json").
    #[serde_inline_default(String::from("json"))]
    pub log_format: String,

    #[serde_inline_default(String::from("INFO"))]
    pub log_level: String,

    #[serde_inline_default(false)]
    pub log_include_stacktrace: bool,

    /// Base URL for RSS feeds and media files.
    #[serde_inline_default(String::from("http://localhost:8024"))]
    pub base_url: String,

    /// Root directory for all application data.
    #[serde_inline_default(PathBuf::from("/data"))]
    pub data_dir: PathBuf,

    #[serde_inline_default(String::from("0.0.0.0"))]
    pub server_host: String,

    #[serde_inline_default(8024u16)]
    pub server_port: u16,

    /// Private bind for the admin surface.
    #[serde_inline_default(String::from("127.0.0.1"))]
    pub admin_host: String,

    #[serde_inline_default(8025u16)]
    pub admin_port: u16,

    /// Trusted proxy addresses/networks; enables forwarded-header handling.
    #[serde(default, deserialize_with = "deserialize_string_list")]
    pub trusted_proxies: Option<Vec<String>>,

    /// Timezone for cron evaluation; `None` means UTC.
    #[serde(default)]
    pub tz: Option<String>,

    #[serde_inline_default(PathBuf::from("/config/feeds.yaml"))]
    pub config_file: PathBuf,

    /// Cookies file forwarded to the fetcher for authentication.
    #[serde(default)]
    pub cookies_path: Option<PathBuf>,

    /// Bounded concurrent feed processing across scheduler and manual runs.
    #[serde_inline_default(4usize)]
    pub max_concurrent_feeds: usize,
}

impl Default for AppSettings {
    #[expect(clippy::expect_used)]
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).expect("defaults are complete")
    }
}

impl AppSettings {
    /// Load settings: built-in defaults overlaid with environment variables.
    ///
    /// # Errors
    /// Returns `PipelineError::ConfigLoad` on malformed values
    pub fn load() -> Result<Self, PipelineError> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Env::raw().only(&[
                "LOG_FORMAT",
                "LOG_LEVEL",
                "LOG_INCLUDE_STACKTRACE",
                "BASE_URL",
                "DATA_DIR",
                "SERVER_HOST",
                "SERVER_PORT",
                "ADMIN_HOST",
                "ADMIN_PORT",
                "TRUSTED_PROXIES",
                "TZ",
                "CONFIG_FILE",
                "COOKIES_PATH",
                "MAX_CONCURRENT_FEEDS",
            ]))
            .extract()
            .map_err(|err| PipelineError::ConfigLoad {
                path: PathBuf::from("<env>"),
                message: err.to_string(),
            })
    }
}

fn deserialize_string_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        List(Vec<String>),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::List(list)) => Some(list),
        Some(Raw::Str(s)) if s.trim().is_empty() => None,
        Some(Raw::Str(s)) => Some(
            s.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        ),
    })
}

/// Podcast metadata overrides for RSS generation. Anything left unset is
/// filled from the source where possible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedMetadataOverrides {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub author: Option<String>,
    pub author_email: Option<String>,
    pub image_url: Option<String>,
    #[serde(rename = "category")]
    pub categories: Option<PodcastCategories>,
    pub podcast_type: Option<PodcastType>,
    pub explicit: Option<PodcastExplicit>,
}

/// Configuration for a single feed.
#[serde_inline_default]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde_inline_default(true)]
    pub enabled: bool,

    pub url: String,

    /// Accepts only operator-submitted URLs; no cron schedule.
    #[serde_inline_default(false)]
    pub is_manual: bool,

    /// Cron expression (5 or 6 fields). Required unless `is_manual`.
    #[serde(default)]
    pub schedule: Option<String>,

    /// Extra yt-dlp arguments, tokenized like a shell argv.
    #[serde(default)]
    pub yt_args: Option<String>,

    /// Retention: keep only this many newest items.
    #[serde(default)]
    pub keep_last: Option<i64>,

    /// Retention: drop items published before this instant.
    #[serde(default)]
    pub since: Option<chrono::DateTime<chrono::Utc>>,

    #[serde_inline_default(3i64)]
    pub max_errors: i64,

    #[serde(default)]
    pub transcript_lang: Option<String>,

    #[serde(default)]
    pub transcript_source_priority: Option<Vec<TranscriptSource>>,

    #[serde(default)]
    pub metadata: Option<FeedMetadataOverrides>,
}

impl FeedConfig {
    /// Tokenize `yt_args` into an argv.
    ///
    /// # Errors
    /// Returns `PipelineError::ConfigLoad` when the string is not shell-splittable
    pub fn yt_cli_args(&self) -> Result<Vec<String>, PipelineError> {
        match &self.yt_args {
            None => Ok(Vec::new()),
            Some(raw) => shell_words::split(raw).map_err(|err| PipelineError::ConfigLoad {
                path: PathBuf::from("<yt_args>"),
                message: format!("invalid yt_args string '{raw}': {err}"),
            }),
        }
    }

    /// Transcript source order, defaulting to creator-first.
    #[must_use]
    pub fn transcript_priority(&self) -> Vec<TranscriptSource> {
        self.transcript_source_priority
            .clone()
            .unwrap_or_else(|| vec![TranscriptSource::Creator, TranscriptSource::Auto])
    }
}

#[derive(Debug, Deserialize)]
struct FeedsFile {
    #[serde(default)]
    feeds: BTreeMap<String, FeedConfig>,
}

/// Load and validate the feeds YAML document.
///
/// # Errors
/// Returns `PipelineError::ConfigLoad` on I/O, parse, or validation failure
pub async fn load_feeds(path: &Path) -> Result<BTreeMap<String, FeedConfig>, PipelineError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| PipelineError::ConfigLoad {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

    let parsed: FeedsFile =
        serde_yaml::from_str(&raw).map_err(|err| PipelineError::ConfigLoad {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

    validate_feeds(path, &parsed.feeds)?;
    Ok(parsed.feeds)
}

fn validate_feeds(
    path: &Path,
    feeds: &BTreeMap<String, FeedConfig>,
) -> Result<(), PipelineError> {
    let invalid = |message: String| PipelineError::ConfigLoad {
        path: path.to_path_buf(),
        message,
    };

    for (feed_id, config) in feeds {
        if !is_valid_feed_id(feed_id) {
            return Err(invalid(format!(
                "invalid feed id '{feed_id}' (1-255 chars, [A-Za-z0-9_-])"
            )));
        }
        if config.url.trim().is_empty() {
            return Err(invalid(format!("feed '{feed_id}' has an empty url")));
        }
        if !config.is_manual && config.schedule.as_deref().is_none_or(str::is_empty) {
            return Err(invalid(format!(
                "feed '{feed_id}' requires a schedule unless is_manual is true"
            )));
        }
        if config.keep_last.is_some_and(|n| n < 1) {
            return Err(invalid(format!("feed '{feed_id}': keep_last must be >= 1")));
        }
        if config.max_errors < 1 {
            return Err(invalid(format!("feed '{feed_id}': max_errors must be >= 1")));
        }
        config.yt_cli_args()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_feeds(yaml: &str) -> Result<BTreeMap<String, FeedConfig>, PipelineError> {
        let parsed: FeedsFile = serde_yaml::from_str(yaml).unwrap();
        validate_feeds(Path::new("feeds.yaml"), &parsed.feeds)?;
        Ok(parsed.feeds)
    }

    #[test]
    fn parses_a_full_feed() {
        let feeds = parse_feeds(
            r#"
feeds:
  my_channel:
    url: https://www.youtube.com/@somechannel
    schedule: "0 3 * * *"
    yt_args: "-f bestaudio --no-playlist"
    keep_last: 10
    since: 2024-01-01T00:00:00Z
    max_errors: 5
    transcript_lang: en
    transcript_source_priority: [creator, auto]
    metadata:
      title: My Channel
      category: "News > Tech News"
      podcast_type: episodic
      explicit: clean
"#,
        )
        .unwrap();

        let config = &feeds["my_channel"];
        assert!(config.enabled);
        assert_eq!(config.keep_last, Some(10));
        assert_eq!(config.max_errors, 5);
        assert_eq!(
            config.yt_cli_args().unwrap(),
            vec!["-f", "bestaudio", "--no-playlist"]
        );
        let meta = config.metadata.as_ref().unwrap();
        assert_eq!(meta.explicit, Some(PodcastExplicit::Clean));
        assert_eq!(
            meta.categories.as_ref().unwrap().to_string(),
            "News > Tech News"
        );
    }

    #[test]
    fn manual_feeds_need_no_schedule() {
        let feeds = parse_feeds(
            r"
feeds:
  inbox:
    url: https://example.com
    is_manual: true
",
        )
        .unwrap();
        assert!(feeds["inbox"].is_manual);
        assert!(feeds["inbox"].schedule.is_none());
    }

    #[test]
    fn scheduled_feeds_require_a_schedule() {
        assert!(parse_feeds(
            r"
feeds:
  broken:
    url: https://example.com
",
        )
        .is_err());
    }

    #[test]
    fn rejects_bad_feed_ids_and_bounds() {
        assert!(parse_feeds(
            r#"
feeds:
  "bad feed id":
    url: https://example.com
    schedule: "0 3 * * *"
"#,
        )
        .is_err());

        assert!(parse_feeds(
            r#"
feeds:
  ok:
    url: https://example.com
    schedule: "0 3 * * *"
    keep_last: 0
"#,
        )
        .is_err());
    }

    #[test]
    fn explicit_accepts_yaml_booleans() {
        let feeds = parse_feeds(
            r#"
feeds:
  f1:
    url: https://example.com
    schedule: "0 3 * * *"
    metadata:
      explicit: true
"#,
        )
        .unwrap();
        assert_eq!(
            feeds["f1"].metadata.as_ref().unwrap().explicit,
            Some(PodcastExplicit::Yes)
        );
    }

    #[test]
    fn transcript_priority_defaults_creator_first() {
        let feeds = parse_feeds(
            r#"
feeds:
  f1:
    url: https://example.com
    schedule: "0 3 * * *"
"#,
        )
        .unwrap();
        assert_eq!(
            feeds["f1"].transcript_priority(),
            vec![TranscriptSource::Creator, TranscriptSource::Auto]
        );
    }
}
