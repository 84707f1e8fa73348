//! Shared state for HTTP handlers

use std::collections::BTreeMap;
use std::sync::Arc;

use anypod_db::Database;
use anypod_pipeline::{
    FeedConfig, FeedCoordinator, FileStore, ManualRunner, ManualSubmissionService, PathManager,
};

/// Application state shared across handlers.
pub struct ApiState {
    pub db: Database,
    pub paths: PathManager,
    pub filestore: FileStore,
    pub feed_configs: BTreeMap<String, FeedConfig>,
    pub coordinator: Arc<FeedCoordinator>,
    pub manual_runner: Arc<ManualRunner>,
    pub submissions: Arc<ManualSubmissionService>,
    /// Proxies whose forwarded headers are trusted for client-ip logging.
    pub trusted_proxies: Option<Vec<String>>,
}
