//! Download lifecycle status

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Lifecycle state of a single download.
///
/// Stored in the database as the uppercase variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum DownloadStatus {
    /// Live or scheduled item that is not yet available on demand.
    Upcoming,
    /// VOD item waiting to be downloaded.
    Queued,
    /// Media file is on disk.
    Downloaded,
    /// Retry budget exhausted.
    Error,
    /// Operator opted the item out of processing.
    Skipped,
    /// Outside the retention window; file deleted, record kept.
    Archived,
}

impl DownloadStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upcoming => "UPCOMING",
            Self::Queued => "QUEUED",
            Self::Downloaded => "DOWNLOADED",
            Self::Error => "ERROR",
            Self::Skipped => "SKIPPED",
            Self::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPCOMING" => Ok(Self::Upcoming),
            "QUEUED" => Ok(Self::Queued),
            "DOWNLOADED" => Ok(Self::Downloaded),
            "ERROR" => Ok(Self::Error),
            "SKIPPED" => Ok(Self::Skipped),
            "ARCHIVED" => Ok(Self::Archived),
            other => Err(CoreError::InvalidDownloadStatus(other.to_string())),
        }
    }
}
