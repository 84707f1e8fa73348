//! Repositories over the SQLite pool

mod app_state;
mod download;
mod feed;

pub use app_state::AppStateRepo;
pub use download::{DownloadRepo, RetryBumpOutcome};
pub use feed::{FeedMetadataUpdate, FeedRepo};
