//! Pruning with real files plus RSS output on disk.

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use anypod_core::{Download, DownloadStatus, Feed};
use anypod_db::Database;
use anypod_pipeline::{FileStore, PathManager, Pruner, RssGenerator};

fn downloaded(feed_id: &str, id: &str, day: u32) -> Download {
    Download {
        feed_id: feed_id.to_string(),
        id: id.to_string(),
        source_url: format!("https://example.com/watch?v={id}"),
        title: format!("episode {id}"),
        published: Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap(),
        ext: "m4a".to_string(),
        mime_type: "audio/mp4".to_string(),
        filesize: 11,
        duration: 60,
        status: DownloadStatus::Downloaded,
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

struct Harness {
    db: Database,
    paths: PathManager,
    filestore: FileStore,
    _data_dir: TempDir,
}

async fn harness() -> Harness {
    let data_dir = TempDir::new().unwrap();
    let db = Database::open_in_memory().await.unwrap();
    let paths = PathManager::new(data_dir.path(), "https://pods.example.com");
    let filestore = FileStore::new(paths.clone());

    let mut feed = Feed::new(
        "f1".to_string(),
        "https://example.com/channel".to_string(),
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    );
    feed.title = Some("Channel".to_string());
    feed.description = Some("About things".to_string());
    db.feeds().upsert_feed(&feed).await.unwrap();

    Harness {
        db,
        paths,
        filestore,
        _data_dir: data_dir,
    }
}

async fn place_media(h: &Harness, download: &Download) {
    let dir = h.paths.feed_media_dir(&download.feed_id).await.unwrap();
    tokio::fs::write(
        dir.join(format!("{}.{}", download.id, download.ext)),
        b"media-bytes",
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn keep_last_prunes_oldest_and_deletes_files() {
    let h = harness().await;
    let pruner = Pruner::new(h.db.clone(), h.filestore.clone());

    for (id, day) in [("v1", 1), ("v2", 2), ("v3", 3)] {
        let dl = downloaded("f1", id, day);
        h.db.downloads().upsert_download(&dl).await.unwrap();
        place_media(&h, &dl).await;
    }
    assert_eq!(h.db.feeds().get_feed_by_id("f1").await.unwrap().total_downloads, 3);

    let (archived, files_deleted) = pruner
        .prune_feed_downloads("f1", Some(2), None)
        .await
        .unwrap();
    assert_eq!(archived, vec!["v1"]);
    assert_eq!(files_deleted, vec!["v1"]);

    // counter maintained by trigger on the transition out of DOWNLOADED
    assert_eq!(h.db.feeds().get_feed_by_id("f1").await.unwrap().total_downloads, 2);
    assert!(!h.filestore.media_file_exists("f1", "v1", "m4a").await.unwrap());
    assert!(h.filestore.media_file_exists("f1", "v2", "m4a").await.unwrap());
}

#[tokio::test]
async fn missing_file_archives_with_a_warning_not_an_error() {
    let h = harness().await;
    let pruner = Pruner::new(h.db.clone(), h.filestore.clone());

    // record says DOWNLOADED but nothing is on disk
    h.db.downloads()
        .upsert_download(&downloaded("f1", "v1", 1))
        .await
        .unwrap();

    let (archived, files_deleted) = pruner
        .prune_feed_downloads("f1", None, Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()))
        .await
        .unwrap();
    assert_eq!(archived, vec!["v1"]);
    assert!(files_deleted.is_empty());
}

#[tokio::test]
async fn rss_contains_one_item_per_downloaded_episode() {
    let h = harness().await;
    let rss = RssGenerator::new(h.db.clone(), h.paths.clone(), h.filestore.clone());

    for (id, day) in [("v1", 1), ("v2", 2)] {
        h.db.downloads()
            .upsert_download(&downloaded("f1", id, day))
            .await
            .unwrap();
    }
    // archived items never appear in the feed
    let mut gone = downloaded("f1", "v0", 3);
    gone.status = DownloadStatus::Archived;
    h.db.downloads().upsert_download(&gone).await.unwrap();

    let count = rss.generate_feed("f1").await.unwrap();
    assert_eq!(count, 2);

    let xml = tokio::fs::read_to_string(h.paths.base_feeds_dir().join("f1.xml"))
        .await
        .unwrap();
    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert_eq!(xml.matches("<enclosure").count(), 2);
    assert!(xml.contains("https://pods.example.com/media/f1/v2.m4a"));
    assert!(xml.contains("https://pods.example.com/media/f1/v1.m4a"));
    assert!(!xml.contains("v0.m4a"));
    assert!(xml.contains("length=\"11\""));

    // the generation timestamp is recorded on the feed
    let feed = h.db.feeds().get_feed_by_id("f1").await.unwrap();
    assert!(feed.last_rss_generation.is_some());
}

#[tokio::test]
async fn rss_orders_items_newest_first() {
    let h = harness().await;
    let rss = RssGenerator::new(h.db.clone(), h.paths.clone(), h.filestore.clone());

    for (id, day) in [("old", 1), ("new", 20)] {
        h.db.downloads()
            .upsert_download(&downloaded("f1", id, day))
            .await
            .unwrap();
    }
    rss.generate_feed("f1").await.unwrap();

    let xml = tokio::fs::read_to_string(h.paths.base_feeds_dir().join("f1.xml"))
        .await
        .unwrap();
    let new_pos = xml.find("media/f1/new.m4a").unwrap();
    let old_pos = xml.find("media/f1/old.m4a").unwrap();
    assert!(new_pos < old_pos);
}
