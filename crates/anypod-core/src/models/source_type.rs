//! Feed source classification

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// What kind of upstream source a feed points at.
///
/// Set by the first successful discovery; `Unknown` until then.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SourceType {
    Channel,
    Playlist,
    SingleVideo,
    Unknown,
}

impl SourceType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::Playlist => "playlist",
            Self::SingleVideo => "single_video",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "channel" => Ok(Self::Channel),
            "playlist" => Ok(Self::Playlist),
            "single_video" => Ok(Self::SingleVideo),
            "unknown" => Ok(Self::Unknown),
            other => Err(CoreError::InvalidSourceType(other.to_string())),
        }
    }
}
