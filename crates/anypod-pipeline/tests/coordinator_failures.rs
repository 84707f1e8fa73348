//! Pipeline behavior when the fetcher is unavailable or failing.
//!
//! These tests drive the real coordinator against an in-memory database;
//! fetcher invocations fail fast (missing binary or unusable URL), which is
//! exactly the failure path under test.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use anypod_core::{Download, DownloadStatus, Feed, SourceType};
use anypod_db::Database;
use anypod_fetch::{Fetcher, FfMpeg, FfProbe, ProcessScope};
use anypod_pipeline::{
    Downloader, Enqueuer, FeedConfig, FeedCoordinator, FileStore, ImageDownloader, PathManager,
    Pruner, RssGenerator, StateReconciler,
};

struct Harness {
    db: Database,
    coordinator: FeedCoordinator,
    downloader: Downloader,
    _data_dir: TempDir,
}

fn feed_config(yaml: &str) -> FeedConfig {
    serde_yaml::from_str(yaml).unwrap()
}

async fn harness() -> Harness {
    let data_dir = TempDir::new().unwrap();
    let db = Database::open_in_memory().await.unwrap();
    let paths = PathManager::new(data_dir.path(), "http://localhost:8024");
    let filestore = FileStore::new(paths.clone());

    let scope = ProcessScope::new();
    let fetcher = Arc::new(Fetcher::new(scope.clone(), None));
    let ffprobe = FfProbe::new(scope.clone());
    let images = Arc::new(ImageDownloader::new(
        paths.clone(),
        ffprobe.clone(),
        FfMpeg::new(scope),
    ));

    let downloader = Downloader::new(
        db.clone(),
        Arc::clone(&fetcher),
        paths.clone(),
        filestore.clone(),
        Arc::clone(&images),
        ffprobe.clone(),
    );
    let coordinator = FeedCoordinator::new(
        db.clone(),
        Arc::clone(&fetcher),
        paths.clone(),
        images,
        Enqueuer::new(db.clone(), Arc::clone(&fetcher)),
        Downloader::new(
            db.clone(),
            Arc::clone(&fetcher),
            paths.clone(),
            filestore.clone(),
            Arc::new(ImageDownloader::new(
                paths.clone(),
                ffprobe.clone(),
                FfMpeg::new(ProcessScope::new()),
            )),
            ffprobe,
        ),
        Pruner::new(db.clone(), filestore.clone()),
        RssGenerator::new(db.clone(), paths, filestore),
    );

    Harness {
        db,
        coordinator,
        downloader,
        _data_dir: data_dir,
    }
}

async fn seed_feed(db: &Database, feed_id: &str) {
    let mut feed = Feed::new(
        feed_id.to_string(),
        // a URL the fetcher cannot enumerate
        "https://definitely-not-a-real-source.invalid/feed".to_string(),
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    );
    feed.title = Some("Broken".to_string());
    db.feeds().upsert_feed(&feed).await.unwrap();
}

fn queued_download(feed_id: &str, id: &str) -> Download {
    Download {
        feed_id: feed_id.to_string(),
        id: id.to_string(),
        source_url: "https://definitely-not-a-real-source.invalid/v1".to_string(),
        title: "episode".to_string(),
        published: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ext: "mp4".to_string(),
        mime_type: "video/mp4".to_string(),
        filesize: 100,
        duration: 60,
        status: DownloadStatus::Queued,
        discovered_at: None,
        updated_at: None,
        downloaded_at: None,
        remote_thumbnail_url: None,
        thumbnail_ext: None,
        description: None,
        quality_info: None,
        retries: 0,
        last_error: None,
        download_logs: None,
        playlist_index: None,
        transcript_ext: None,
        transcript_lang: None,
        transcript_source: None,
    }
}

#[tokio::test]
async fn enqueue_failure_aborts_pipeline_and_records_sync_failure() {
    let h = harness().await;
    seed_feed(&h.db, "f1").await;
    let config = feed_config(
        "url: https://definitely-not-a-real-source.invalid/feed\nschedule: \"0 3 * * *\"\n",
    );

    // a fresh watermark keeps the fetcher self-update out of the way
    h.db.app_state().upsert_last_yt_dlp_update(None).await.unwrap();

    let before = h.db.feeds().get_feed_by_id("f1").await.unwrap();
    let results = h.coordinator.process("f1", &config).await;

    assert!(!results.overall_success);
    assert!(results.fatal_error.is_some());
    assert!(!results.enqueue_result.success);
    // pipeline aborted: no later phase ran
    assert!(!results.download_result.success);
    assert!(!results.rss_result.success);
    assert!(!results.feed_sync_updated);

    let after = h.db.feeds().get_feed_by_id("f1").await.unwrap();
    assert_eq!(after.consecutive_failures, before.consecutive_failures + 1);
    assert!(after.last_error.is_some());
    assert!(after.last_failed_sync.is_some());
    // the watermark never moves on failure
    assert_eq!(after.last_successful_sync, before.last_successful_sync);
}

#[tokio::test]
async fn download_failures_bump_retries_until_error() {
    let h = harness().await;
    seed_feed(&h.db, "f1").await;
    // discovery already done, so the downloader path is isolated
    h.db.feeds()
        .set_resolved_source("f1", SourceType::SingleVideo, None)
        .await
        .unwrap();
    h.db.downloads()
        .upsert_download(&queued_download("f1", "v1"))
        .await
        .unwrap();

    let config = feed_config(
        "url: https://definitely-not-a-real-source.invalid/feed\nschedule: \"0 3 * * *\"\nmax_errors: 2\n",
    );

    let (success, failure) = h.downloader.download_queued("f1", &config, 0).await.unwrap();
    assert_eq!((success, failure), (0, 1));
    let row = h.db.downloads().get_download_by_id("f1", "v1").await.unwrap();
    assert_eq!(row.status, DownloadStatus::Queued);
    assert_eq!(row.retries, 1);
    assert!(row.last_error.is_some());

    // second failed attempt exhausts max_errors=2
    let (_, failure) = h.downloader.download_queued("f1", &config, 0).await.unwrap();
    assert_eq!(failure, 1);
    let row = h.db.downloads().get_download_by_id("f1", "v1").await.unwrap();
    assert_eq!(row.status, DownloadStatus::Error);
    assert_eq!(row.retries, 2);

    // errored items are no longer picked up
    let (success, failure) = h.downloader.download_queued("f1", &config, 0).await.unwrap();
    assert_eq!((success, failure), (0, 0));
}

#[tokio::test]
async fn reconciler_then_failed_pipeline_keeps_feed_schedulable() {
    let h = harness().await;
    let config = feed_config(
        "url: https://definitely-not-a-real-source.invalid/feed\nschedule: \"0 3 * * *\"\n",
    );
    let mut feeds = BTreeMap::new();
    feeds.insert("f1".to_string(), config.clone());

    let pruner = Arc::new(Pruner::new(
        h.db.clone(),
        FileStore::new(PathManager::new(h._data_dir.path(), "http://localhost:8024")),
    ));
    let reconciler = StateReconciler::new(h.db.clone(), pruner);
    let ready = reconciler.reconcile_startup_state(&feeds).await.unwrap();
    assert_eq!(ready, vec!["f1"]);

    h.db.app_state().upsert_last_yt_dlp_update(None).await.unwrap();
    let results = h.coordinator.process("f1", &config).await;
    assert!(!results.overall_success);

    // the feed row survives with its failure ledger; nothing was disabled
    let feed = h.db.feeds().get_feed_by_id("f1").await.unwrap();
    assert!(feed.is_enabled);
    assert!(feed.consecutive_failures >= 1);
}
