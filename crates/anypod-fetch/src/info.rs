//! Typed access over yt-dlp JSON output

use serde_json::Value;

use crate::FetchError;
use crate::thumbnails::Thumbnails;

/// A wrapper around one yt-dlp JSON document for strongly-typed access.
///
/// Missing fields read as `None`; present-but-mistyped fields are errors so
/// upstream format drift surfaces loudly instead of as silent nulls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YtdlpInfo(Value);

impl YtdlpInfo {
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// Raw field access without type checking.
    #[must_use]
    pub fn raw(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|v| !v.is_null())
    }

    /// String field; `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::FieldInvalid` when present with a non-string type
    pub fn get_str(&self, field: &'static str) -> Result<Option<&str>, FetchError> {
        match self.raw(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(FetchError::FieldInvalid {
                field,
                actual: other.to_string(),
            }),
        }
    }

    /// Required string field.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::FieldMissing` / `FieldInvalid`
    pub fn req_str(&self, field: &'static str) -> Result<&str, FetchError> {
        self.get_str(field)?
            .ok_or(FetchError::FieldMissing { field })
    }

    /// Integer field; floats are truncated. `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::FieldInvalid` when present with a non-numeric type
    pub fn get_i64(&self, field: &'static str) -> Result<Option<i64>, FetchError> {
        match self.raw(field) {
            None => Ok(None),
            Some(Value::Number(n)) => {
                #[expect(clippy::cast_possible_truncation)]
                let value = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64));
                value.map(Some).ok_or_else(|| FetchError::FieldInvalid {
                    field,
                    actual: n.to_string(),
                })
            }
            Some(other) => Err(FetchError::FieldInvalid {
                field,
                actual: other.to_string(),
            }),
        }
    }

    /// Required integer field.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::FieldMissing` / `FieldInvalid`
    pub fn req_i64(&self, field: &'static str) -> Result<i64, FetchError> {
        self.get_i64(field)?
            .ok_or(FetchError::FieldMissing { field })
    }

    /// Boolean field; `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::FieldInvalid` when present with a non-bool type
    pub fn get_bool(&self, field: &'static str) -> Result<Option<bool>, FetchError> {
        match self.raw(field) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(FetchError::FieldInvalid {
                field,
                actual: other.to_string(),
            }),
        }
    }

    /// Duration in seconds, tolerating number-or-string payloads.
    ///
    /// Bools are rejected outright; unparsable strings are errors.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::FieldInvalid` on malformed values
    pub fn duration_seconds(&self) -> Result<Option<i64>, FetchError> {
        match self.raw("duration") {
            None => Ok(None),
            Some(Value::Bool(_)) => Err(FetchError::FieldInvalid {
                field: "duration",
                actual: "bool".to_string(),
            }),
            Some(Value::Number(n)) => {
                #[expect(clippy::cast_possible_truncation)]
                let value = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64));
                Ok(value)
            }
            Some(Value::String(s)) => s
                .parse::<f64>()
                .map(|f| {
                    #[expect(clippy::cast_possible_truncation)]
                    let secs = f as i64;
                    Some(secs)
                })
                .map_err(|_| FetchError::FieldInvalid {
                    field: "duration",
                    actual: s.clone(),
                }),
            Some(other) => Err(FetchError::FieldInvalid {
                field: "duration",
                actual: other.to_string(),
            }),
        }
    }

    /// Playlist entries as wrapped infos; entry slots can be null.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::FieldInvalid` when the entries field is not a list
    pub fn entries(&self) -> Result<Option<Vec<Option<Self>>>, FetchError> {
        match self.raw("entries") {
            None => Ok(None),
            Some(Value::Array(items)) => Ok(Some(
                items
                    .iter()
                    .map(|item| {
                        if item.is_null() {
                            None
                        } else {
                            Some(Self(item.clone()))
                        }
                    })
                    .collect(),
            )),
            Some(other) => Err(FetchError::FieldInvalid {
                field: "entries",
                actual: other.to_string(),
            }),
        }
    }

    /// Thumbnail candidates from the `thumbnails` array.
    #[must_use]
    pub fn thumbnails(&self) -> Option<Thumbnails> {
        match self.raw("thumbnails") {
            Some(Value::Array(items)) => Some(Thumbnails::from_values(items)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_fields_read_as_none() {
        let info = YtdlpInfo::new(json!({"id": "abc"}));
        assert_eq!(info.get_str("title").unwrap(), None);
        assert_eq!(info.get_i64("filesize").unwrap(), None);
    }

    #[test]
    fn mistyped_fields_are_errors() {
        let info = YtdlpInfo::new(json!({"title": 42}));
        assert!(matches!(
            info.get_str("title"),
            Err(FetchError::FieldInvalid { field: "title", .. })
        ));
    }

    #[test]
    fn duration_accepts_numbers_and_strings() {
        let info = YtdlpInfo::new(json!({"duration": 620.7}));
        assert_eq!(info.duration_seconds().unwrap(), Some(620));

        let info = YtdlpInfo::new(json!({"duration": "95.5"}));
        assert_eq!(info.duration_seconds().unwrap(), Some(95));

        let info = YtdlpInfo::new(json!({"duration": true}));
        assert!(info.duration_seconds().is_err());
    }

    #[test]
    fn entries_preserve_null_slots() {
        let info = YtdlpInfo::new(json!({"entries": [{"id": "a"}, null]}));
        let entries = info.entries().unwrap().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_some());
        assert!(entries[1].is_none());
    }
}
