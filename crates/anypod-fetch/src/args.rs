//! Builder for yt-dlp command-line arguments
//!
//! User-provided arguments are preserved and prepended to the final list so
//! operator flags win only where yt-dlp lets the last occurrence win.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Type-safe builder for a yt-dlp invocation.
///
/// ```ignore
/// let args = YtdlpArgs::new(user_args)
///     .quiet()
///     .no_warnings()
///     .skip_download()
///     .flat_playlist();
/// ```
#[derive(Debug, Clone, Default)]
pub struct YtdlpArgs {
    additional_args: Vec<String>,

    // output control
    quiet: bool,
    no_warnings: bool,
    dump_single_json: bool,
    dump_json: bool,

    // download control
    skip_download: bool,

    // playlist control
    flat_playlist: bool,
    lazy_playlist: bool,
    playlist_limit: Option<i64>,
    playlist_items: Option<i64>,
    break_match_filters: Option<String>,

    // date filtering (day granularity)
    dateafter: Option<DateTime<Utc>>,
    datebefore: Option<DateTime<Utc>>,

    // output configuration
    output: Option<String>,
    convert_thumbnails: Option<String>,
    write_thumbnail: bool,

    // subtitles
    write_subs: bool,
    write_auto_subs: bool,
    sub_langs: Option<String>,
    sub_format: Option<String>,

    // path configuration
    paths_temp: Option<PathBuf>,
    paths_home: Option<PathBuf>,

    // authentication
    cookies: Option<PathBuf>,

    // update control
    update_to: Option<String>,

    // networking / filtering
    referer: Option<String>,
    match_filter: Option<String>,
}

impl YtdlpArgs {
    #[must_use]
    pub fn new(user_args: &[String]) -> Self {
        Self {
            additional_args: user_args.to_vec(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    #[must_use]
    pub const fn no_warnings(mut self) -> Self {
        self.no_warnings = true;
        self
    }

    /// Output all metadata as a single JSON document.
    #[must_use]
    pub const fn dump_single_json(mut self) -> Self {
        self.dump_single_json = true;
        self
    }

    /// Output one JSON document per item.
    #[must_use]
    pub const fn dump_json(mut self) -> Self {
        self.dump_json = true;
        self
    }

    /// Extract metadata only, don't download media.
    #[must_use]
    pub const fn skip_download(mut self) -> Self {
        self.skip_download = true;
        self
    }

    /// Extract playlist metadata without resolving individual entries.
    #[must_use]
    pub const fn flat_playlist(mut self) -> Self {
        self.flat_playlist = true;
        self
    }

    /// Process playlist entries sequentially, enabling early termination.
    #[must_use]
    pub const fn lazy_playlist(mut self) -> Self {
        self.lazy_playlist = true;
        self
    }

    /// Limit enumeration to the first `limit` playlist items.
    #[must_use]
    pub const fn playlist_limit(mut self, limit: i64) -> Self {
        self.playlist_limit = Some(limit);
        self
    }

    /// Select a single 1-based playlist item (multi-attachment posts).
    #[must_use]
    pub const fn playlist_items(mut self, index: i64) -> Self {
        self.playlist_items = Some(index);
        self
    }

    /// Stop processing when the filter condition fails.
    #[must_use]
    pub fn break_match_filters(mut self, filter_expr: impl Into<String>) -> Self {
        self.break_match_filters = Some(filter_expr.into());
        self
    }

    /// Only consider items uploaded on or after this date (day granularity).
    #[must_use]
    pub const fn dateafter(mut self, date: DateTime<Utc>) -> Self {
        self.dateafter = Some(date);
        self
    }

    /// Only consider items uploaded on or before this date (day granularity).
    #[must_use]
    pub const fn datebefore(mut self, date: DateTime<Utc>) -> Self {
        self.datebefore = Some(date);
        self
    }

    /// Set the output filename template.
    #[must_use]
    pub fn output(mut self, template: impl Into<String>) -> Self {
        self.output = Some(template.into());
        self
    }

    /// Convert thumbnails to the given format (jpg, png, webp).
    #[must_use]
    pub fn convert_thumbnails(mut self, format: impl Into<String>) -> Self {
        self.convert_thumbnails = Some(format.into());
        self
    }

    #[must_use]
    pub const fn write_thumbnail(mut self) -> Self {
        self.write_thumbnail = true;
        self
    }

    /// Request creator-uploaded subtitles.
    #[must_use]
    pub const fn write_subs(mut self) -> Self {
        self.write_subs = true;
        self
    }

    /// Request auto-generated subtitles.
    #[must_use]
    pub const fn write_auto_subs(mut self) -> Self {
        self.write_auto_subs = true;
        self
    }

    /// Restrict subtitles to the given language code.
    #[must_use]
    pub fn sub_langs(mut self, langs: impl Into<String>) -> Self {
        self.sub_langs = Some(langs.into());
        self
    }

    /// Preferred subtitle format (e.g. "vtt").
    #[must_use]
    pub fn sub_format(mut self, format: impl Into<String>) -> Self {
        self.sub_format = Some(format.into());
        self
    }

    /// Temporary directory for in-progress downloads.
    #[must_use]
    pub fn paths_temp(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths_temp = Some(path.into());
        self
    }

    /// Final directory for downloads.
    #[must_use]
    pub fn paths_home(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths_home = Some(path.into());
        self
    }

    /// Cookies file for authentication.
    #[must_use]
    pub fn cookies(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookies = Some(path.into());
        self
    }

    /// Self-update to the given channel before running.
    #[must_use]
    pub fn update_to(mut self, channel: impl Into<String>) -> Self {
        self.update_to = Some(channel.into());
        self
    }

    /// Set the HTTP Referer header.
    #[must_use]
    pub fn referer(mut self, referer_url: impl Into<String>) -> Self {
        self.referer = Some(referer_url.into());
        self
    }

    /// Include only entries matching the filter expression.
    #[must_use]
    pub fn match_filter(mut self, filter_expr: impl Into<String>) -> Self {
        self.match_filter = Some(filter_expr.into());
        self
    }

    /// Render the CLI argument list (binary name excluded).
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        let mut cmd: Vec<String> = self.additional_args.clone();

        if self.quiet {
            cmd.push("--quiet".into());
        }
        if self.no_warnings {
            cmd.push("--no-warnings".into());
        }
        if self.dump_single_json {
            cmd.push("--dump-single-json".into());
        }
        if self.dump_json {
            cmd.push("--dump-json".into());
        }

        if self.skip_download {
            cmd.push("--skip-download".into());
        }

        if self.flat_playlist {
            cmd.push("--flat-playlist".into());
        }
        if self.lazy_playlist {
            cmd.push("--lazy-playlist".into());
        }
        if let Some(limit) = self.playlist_limit {
            cmd.extend(["--playlist-items".into(), format!(":{limit}")]);
        }
        if let Some(index) = self.playlist_items {
            cmd.extend(["--playlist-items".into(), index.to_string()]);
        }
        if let Some(filter) = &self.break_match_filters {
            cmd.extend(["--break-match-filters".into(), filter.clone()]);
        }

        if let Some(date) = self.dateafter {
            cmd.extend(["--dateafter".into(), date.format("%Y%m%d").to_string()]);
        }
        if let Some(date) = self.datebefore {
            cmd.extend(["--datebefore".into(), date.format("%Y%m%d").to_string()]);
        }

        if let Some(template) = &self.output {
            cmd.extend(["--output".into(), template.clone()]);
        }
        if let Some(format) = &self.convert_thumbnails {
            cmd.extend(["--convert-thumbnails".into(), format.clone()]);
        }
        if self.write_thumbnail {
            cmd.push("--write-thumbnail".into());
        }

        if self.write_subs {
            cmd.push("--write-subs".into());
        }
        if self.write_auto_subs {
            cmd.push("--write-auto-subs".into());
        }
        if let Some(langs) = &self.sub_langs {
            cmd.extend(["--sub-langs".into(), langs.clone()]);
        }
        if let Some(format) = &self.sub_format {
            cmd.extend(["--sub-format".into(), format.clone()]);
        }

        if let Some(path) = &self.paths_temp {
            cmd.extend(["--paths".into(), format!("temp:{}", path.display())]);
        }
        if let Some(path) = &self.paths_home {
            cmd.extend(["--paths".into(), format!("home:{}", path.display())]);
        }

        if let Some(path) = &self.cookies {
            cmd.extend(["--cookies".into(), path.display().to_string()]);
        }

        if let Some(referer_url) = &self.referer {
            cmd.extend(["--referer".into(), referer_url.clone()]);
        }
        if let Some(filter) = &self.match_filter {
            cmd.extend(["--match-filter".into(), filter.clone()]);
        }

        if let Some(channel) = &self.update_to {
            cmd.extend(["--update-to".into(), channel.clone()]);
        }

        cmd
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn user_args_come_first() {
        let args = YtdlpArgs::new(&["-f".to_string(), "bestaudio".to_string()])
            .quiet()
            .no_warnings();
        assert_eq!(args.to_vec(), vec!["-f", "bestaudio", "--quiet", "--no-warnings"]);
    }

    #[test]
    fn dateafter_uses_day_granularity() {
        let date = Utc.with_ymd_and_hms(2024, 6, 15, 18, 42, 7).unwrap();
        let args = YtdlpArgs::default().dateafter(date);
        assert_eq!(args.to_vec(), vec!["--dateafter", "20240615"]);
    }

    #[test]
    fn playlist_limit_renders_range_syntax() {
        let args = YtdlpArgs::default().playlist_limit(5);
        assert_eq!(args.to_vec(), vec!["--playlist-items", ":5"]);

        let args = YtdlpArgs::default().playlist_items(3);
        assert_eq!(args.to_vec(), vec!["--playlist-items", "3"]);
    }

    #[test]
    fn paths_are_prefixed() {
        let args = YtdlpArgs::default()
            .paths_temp("/data/tmp/f1")
            .paths_home("/data/media/f1");
        assert_eq!(
            args.to_vec(),
            vec!["--paths", "temp:/data/tmp/f1", "--paths", "home:/data/media/f1"]
        );
    }
}
