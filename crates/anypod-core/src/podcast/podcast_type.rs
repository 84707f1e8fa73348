//! iTunes podcast type

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Value of the `itunes:type` channel tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PodcastType {
    Episodic,
    Serial,
}

impl PodcastType {
    /// String emitted into the RSS output.
    #[must_use]
    pub const fn rss_str(self) -> &'static str {
        match self {
            Self::Episodic => "episodic",
            Self::Serial => "serial",
        }
    }
}

impl fmt::Display for PodcastType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rss_str())
    }
}

impl FromStr for PodcastType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "episodic" => Ok(Self::Episodic),
            "serial" => Ok(Self::Serial),
            other => Err(CoreError::InvalidPodcastType(other.to_string())),
        }
    }
}
