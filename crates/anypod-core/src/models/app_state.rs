//! Application-wide state (single row)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Primary key of the only row in the `app_state` table.
pub const APP_STATE_ID: &str = "global";

/// Process-wide persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AppState {
    pub id: String,
    /// Rate-limit watermark for `yt-dlp --update-to`.
    pub last_yt_dlp_update: Option<DateTime<Utc>>,
}
