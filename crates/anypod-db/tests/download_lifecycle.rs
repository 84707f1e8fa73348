//! Lifecycle and trigger behavior against an in-memory database.

use chrono::{Duration, TimeZone, Utc};

use anypod_core::{Download, DownloadStatus, Feed, UPCOMING_EXT, UPCOMING_MIME, UPCOMING_SENTINEL};
use anypod_db::{Database, DbError};

fn feed(id: &str) -> Feed {
    Feed::new(
        id.to_string(),
        format!("https://example.com/{id}"),
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    )
}

fn download(feed_id: &str, id: &str, status: DownloadStatus, published_day: u32) -> Download {
    Download {
        feed_id: feed_id.to_string(),
        id: id.to_string(),
        source_url: format!("https://example.com/watch?v={id}"),
        title: format!("episode {id}"),
        published: Utc.with_ymd_and_hms(2024, 6, published_day, 12, 0, 0).unwrap(),
        ext: "mp4".to_string(),
        mime_type: "video/mp4".to_string(),
        filesize: 1024,
        duration: 620,
        status,
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

async fn db_with_feed(feed_id: &str) -> Database {
    let db = Database::open_in_memory().await.unwrap();
    db.feeds().upsert_feed(&feed(feed_id)).await.unwrap();
    db
}

#[tokio::test]
async fn total_downloads_tracks_downloaded_rows() {
    let db = db_with_feed("f1").await;
    let downloads = db.downloads();

    downloads
        .upsert_download(&download("f1", "v1", DownloadStatus::Queued, 1))
        .await
        .unwrap();
    assert_eq!(db.feeds().get_feed_by_id("f1").await.unwrap().total_downloads, 0);

    downloads
        .mark_as_downloaded("f1", "v1", "mp4", 2048, Some(620))
        .await
        .unwrap();
    assert_eq!(db.feeds().get_feed_by_id("f1").await.unwrap().total_downloads, 1);

    // inserting a row already in DOWNLOADED also counts
    downloads
        .upsert_download(&download("f1", "v2", DownloadStatus::Downloaded, 2))
        .await
        .unwrap();
    assert_eq!(db.feeds().get_feed_by_id("f1").await.unwrap().total_downloads, 2);

    downloads.archive_download("f1", "v1").await.unwrap();
    assert_eq!(db.feeds().get_feed_by_id("f1").await.unwrap().total_downloads, 1);

    downloads.delete_download("f1", "v2").await.unwrap();
    assert_eq!(db.feeds().get_feed_by_id("f1").await.unwrap().total_downloads, 0);
}

#[tokio::test]
async fn downloaded_at_is_set_on_first_transition_only() {
    let db = db_with_feed("f1").await;
    let downloads = db.downloads();

    downloads
        .upsert_download(&download("f1", "v1", DownloadStatus::Queued, 1))
        .await
        .unwrap();
    assert!(downloads
        .get_download_by_id("f1", "v1")
        .await
        .unwrap()
        .downloaded_at
        .is_none());

    downloads
        .mark_as_downloaded("f1", "v1", "mp4", 2048, None)
        .await
        .unwrap();
    let first = downloads
        .get_download_by_id("f1", "v1")
        .await
        .unwrap()
        .downloaded_at
        .expect("downloaded_at set by trigger");

    // requeue and download again: downloaded_at is refreshed by the trigger
    // only on transitions into DOWNLOADED, not on unrelated updates
    downloads
        .set_download_logs("f1", "v1", "attempt 2")
        .await
        .unwrap();
    let unchanged = downloads
        .get_download_by_id("f1", "v1")
        .await
        .unwrap()
        .downloaded_at
        .unwrap();
    assert_eq!(first, unchanged);
}

#[tokio::test]
async fn upcoming_to_queued_requires_upcoming() {
    let db = db_with_feed("f1").await;
    let downloads = db.downloads();

    let mut upcoming = download("f1", "v1", DownloadStatus::Upcoming, 1);
    upcoming.ext = UPCOMING_EXT.to_string();
    upcoming.mime_type = UPCOMING_MIME.to_string();
    upcoming.filesize = UPCOMING_SENTINEL;
    upcoming.duration = UPCOMING_SENTINEL;
    downloads.upsert_download(&upcoming).await.unwrap();

    downloads
        .mark_as_queued_from_upcoming("f1", "v1")
        .await
        .unwrap();
    let row = downloads.get_download_by_id("f1", "v1").await.unwrap();
    assert_eq!(row.status, DownloadStatus::Queued);
    // sentinels are only replaced later by mark_as_downloaded
    assert_eq!(row.ext, UPCOMING_EXT);

    let err = downloads
        .mark_as_queued_from_upcoming("f1", "v1")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidTransition { .. }));
}

#[tokio::test]
async fn bump_retries_transitions_at_budget() {
    let db = db_with_feed("f1").await;
    let downloads = db.downloads();
    downloads
        .upsert_download(&download("f1", "v1", DownloadStatus::Queued, 1))
        .await
        .unwrap();

    let first = downloads
        .bump_retries("f1", "v1", "network error", 3)
        .await
        .unwrap();
    assert_eq!(
        (first.new_retries, first.final_status, first.did_transition_to_error),
        (1, DownloadStatus::Queued, false)
    );

    let second = downloads
        .bump_retries("f1", "v1", "network error", 3)
        .await
        .unwrap();
    assert_eq!(second.new_retries, 2);
    assert!(!second.did_transition_to_error);

    let third = downloads
        .bump_retries("f1", "v1", "network error", 3)
        .await
        .unwrap();
    assert_eq!(
        (third.new_retries, third.final_status, third.did_transition_to_error),
        (3, DownloadStatus::Error, true)
    );

    let row = downloads.get_download_by_id("f1", "v1").await.unwrap();
    assert_eq!(row.status, DownloadStatus::Error);
    assert_eq!(row.last_error.as_deref(), Some("network error"));
}

#[tokio::test]
async fn bump_retries_never_errors_a_downloaded_item() {
    let db = db_with_feed("f1").await;
    let downloads = db.downloads();
    downloads
        .upsert_download(&download("f1", "v1", DownloadStatus::Downloaded, 1))
        .await
        .unwrap();

    let outcome = downloads
        .bump_retries("f1", "v1", "thumbnail refresh failed", 1)
        .await
        .unwrap();
    assert_eq!(outcome.final_status, DownloadStatus::Downloaded);
    assert!(!outcome.did_transition_to_error);
    assert_eq!(
        db.feeds().get_feed_by_id("f1").await.unwrap().total_downloads,
        1
    );
}

#[tokio::test]
async fn requeue_bulk_from_error_resets_ledger() {
    let db = db_with_feed("f1").await;
    let downloads = db.downloads();

    let mut errored = download("f1", "v1", DownloadStatus::Error, 1);
    errored.retries = 3;
    errored.last_error = Some("boom".to_string());
    downloads.upsert_download(&errored).await.unwrap();
    downloads
        .upsert_download(&download("f1", "v2", DownloadStatus::Queued, 2))
        .await
        .unwrap();

    let count = downloads
        .requeue_downloads("f1", None, Some(DownloadStatus::Error))
        .await
        .unwrap();
    assert_eq!(count, 1);

    let row = downloads.get_download_by_id("f1", "v1").await.unwrap();
    assert_eq!(row.status, DownloadStatus::Queued);
    assert_eq!(row.retries, 0);
    assert!(row.last_error.is_none());

    // safe no-op when nothing matches
    let count = downloads
        .requeue_downloads("f1", None, Some(DownloadStatus::Error))
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn requeue_by_id_without_from_status_requires_existence() {
    let db = db_with_feed("f1").await;
    let downloads = db.downloads();

    let err = downloads
        .requeue_downloads("f1", Some(&["missing".to_string()]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::DownloadNotFound { .. }));
}

#[tokio::test]
async fn archive_is_idempotent() {
    let db = db_with_feed("f1").await;
    let downloads = db.downloads();
    downloads
        .upsert_download(&download("f1", "v1", DownloadStatus::Downloaded, 1))
        .await
        .unwrap();

    downloads.archive_download("f1", "v1").await.unwrap();
    downloads.archive_download("f1", "v1").await.unwrap();

    let row = downloads.get_download_by_id("f1", "v1").await.unwrap();
    assert_eq!(row.status, DownloadStatus::Archived);
    assert!(row.thumbnail_ext.is_none());
    assert_eq!(
        db.feeds().get_feed_by_id("f1").await.unwrap().total_downloads,
        0
    );
}

#[tokio::test]
async fn prune_queries_exclude_archived_and_skipped() {
    let db = db_with_feed("f1").await;
    let downloads = db.downloads();

    for (id, status, day) in [
        ("v1", DownloadStatus::Downloaded, 1),
        ("v2", DownloadStatus::Downloaded, 2),
        ("v3", DownloadStatus::Downloaded, 3),
        ("v4", DownloadStatus::Skipped, 4),
        ("v5", DownloadStatus::Archived, 5),
    ] {
        downloads
            .upsert_download(&download("f1", id, status, day))
            .await
            .unwrap();
    }

    let by_keep_last = downloads
        .get_downloads_to_prune_by_keep_last("f1", 2)
        .await
        .unwrap();
    assert_eq!(
        by_keep_last.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
        vec!["v1"]
    );

    let cutoff = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();
    let by_since = downloads
        .get_downloads_to_prune_by_since("f1", cutoff)
        .await
        .unwrap();
    assert_eq!(
        by_since.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
        vec!["v1", "v2"]
    );
}

#[tokio::test]
async fn sync_marks_update_failure_ledger() {
    let db = db_with_feed("f1").await;
    let feeds = db.feeds();

    feeds.mark_sync_failure("f1", "fetch failed").await.unwrap();
    feeds.mark_sync_failure("f1", "fetch failed again").await.unwrap();
    let row = feeds.get_feed_by_id("f1").await.unwrap();
    assert_eq!(row.consecutive_failures, 2);
    assert_eq!(row.last_error.as_deref(), Some("fetch failed again"));
    assert!(row.last_failed_sync.is_some());

    let before = row.last_successful_sync;
    feeds.mark_sync_success("f1").await.unwrap();
    let row = feeds.get_feed_by_id("f1").await.unwrap();
    assert_eq!(row.consecutive_failures, 0);
    assert!(row.last_error.is_none());
    assert!(row.last_successful_sync >= before);
}

#[tokio::test]
async fn yt_dlp_update_watermark_rate_limits() {
    let db = Database::open_in_memory().await.unwrap();
    let app_state = db.app_state();

    // seeded NULL row counts as stale
    assert!(app_state
        .update_yt_dlp_timestamp_if_stale(Duration::hours(24))
        .await
        .unwrap());
    // immediately after, the watermark is fresh
    assert!(!app_state
        .update_yt_dlp_timestamp_if_stale(Duration::hours(24))
        .await
        .unwrap());

    let old = Utc::now() - Duration::hours(48);
    app_state.upsert_last_yt_dlp_update(Some(old)).await.unwrap();
    assert!(app_state
        .update_yt_dlp_timestamp_if_stale(Duration::hours(24))
        .await
        .unwrap());
}

#[tokio::test]
async fn skip_preserves_retry_ledger() {
    let db = db_with_feed("f1").await;
    let downloads = db.downloads();

    let mut row = download("f1", "v1", DownloadStatus::Queued, 1);
    row.retries = 2;
    row.last_error = Some("flaky".to_string());
    downloads.upsert_download(&row).await.unwrap();

    downloads.skip_download("f1", "v1").await.unwrap();

    let row = downloads.get_download_by_id("f1", "v1").await.unwrap();
    assert_eq!(row.status, DownloadStatus::Skipped);
    assert_eq!(row.retries, 2);
    assert_eq!(row.last_error.as_deref(), Some("flaky"));
}

#[tokio::test]
async fn app_state_read_reflects_writes() {
    let db = Database::open_in_memory().await.unwrap();
    let app_state = db.app_state();

    assert!(app_state.get_last_yt_dlp_update().await.unwrap().is_none());

    let when = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    app_state.upsert_last_yt_dlp_update(Some(when)).await.unwrap();
    assert_eq!(app_state.get_last_yt_dlp_update().await.unwrap(), Some(when));
}

#[tokio::test]
async fn content_equals_ignores_trigger_timestamps() {
    let db = db_with_feed("f1").await;
    let downloads = db.downloads();

    let row = download("f1", "v1", DownloadStatus::Queued, 1);
    downloads.upsert_download(&row).await.unwrap();
    let stored = downloads.get_download_by_id("f1", "v1").await.unwrap();

    // stored row has discovered_at/updated_at from the database
    assert!(stored.discovered_at.is_some());
    assert!(stored.content_equals(&row));

    let mut changed = row;
    changed.title = "renamed".to_string();
    assert!(!stored.content_equals(&changed));
}
