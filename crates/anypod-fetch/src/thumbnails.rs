//! Thumbnail selection from yt-dlp metadata

use serde_json::Value;

/// One thumbnail candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub url: Option<String>,
    pub preference: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

impl Thumbnail {
    fn from_value(value: &Value) -> Self {
        Self {
            url: value.get("url").and_then(Value::as_str).map(String::from),
            preference: value.get("preference").and_then(Value::as_i64),
            width: value.get("width").and_then(Value::as_i64),
            height: value.get("height").and_then(Value::as_i64),
        }
    }

    /// Podcast clients only render JPG/PNG reliably; WebP candidates are
    /// skipped.
    #[must_use]
    pub fn is_supported_format(&self) -> bool {
        self.url
            .as_deref()
            .is_some_and(|url| url.ends_with(".jpg") || url.ends_with(".png"))
    }
}

/// Thumbnail candidates with quality-based selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Thumbnails(Vec<Thumbnail>);

impl Thumbnails {
    #[must_use]
    pub fn from_values(values: &[Value]) -> Self {
        Self(values.iter().map(Thumbnail::from_value).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The highest-preference thumbnail in a supported format.
    #[must_use]
    pub fn best_supported(&self) -> Option<&Thumbnail> {
        self.0
            .iter()
            .filter(|t| t.is_supported_format())
            .max_by_key(|t| t.preference.unwrap_or(-999))
    }
}
