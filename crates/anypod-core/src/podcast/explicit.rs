//! iTunes explicit flag

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::CoreError;

/// Value of the `itunes:explicit` channel tag.
///
/// Config accepts `true`/`false`/`yes`/`no`/`clean` (YAML booleans included).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PodcastExplicit {
    Yes,
    No,
    Clean,
}

impl PodcastExplicit {
    /// String emitted into the RSS output.
    #[must_use]
    pub const fn rss_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Clean => "clean",
        }
    }
}

impl fmt::Display for PodcastExplicit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rss_str())
    }
}

impl FromStr for PodcastExplicit {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Ok(Self::Yes),
            "false" | "no" => Ok(Self::No),
            "clean" => Ok(Self::Clean),
            other => Err(CoreError::InvalidExplicit(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for PodcastExplicit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bool(true) => Ok(Self::Yes),
            Raw::Bool(false) => Ok(Self::No),
            Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
