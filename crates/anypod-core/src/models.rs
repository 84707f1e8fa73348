//! Domain models shared across the workspace

mod app_state;
mod download;
mod download_status;
mod feed;
mod phase_result;
mod processing_results;
mod source_type;
mod transcript;

pub use app_state::{APP_STATE_ID, AppState};
pub use download::{Download, UPCOMING_EXT, UPCOMING_MIME, UPCOMING_SENTINEL};
pub use download_status::DownloadStatus;
pub use feed::Feed;
pub use phase_result::PhaseResult;
pub use processing_results::ProcessingResults;
pub use source_type::SourceType;
pub use transcript::TranscriptSource;
