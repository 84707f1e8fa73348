//! RSS generation with iTunes podcast extensions
//!
//! Pulls DOWNLOADED items for a feed, renders pretty-printed UTF-8 XML, and
//! persists it under `feeds/<feed_id>.xml`.

use std::collections::BTreeMap;

use rss::extension::itunes::{
    ITunesCategoryBuilder, ITunesChannelExtensionBuilder, ITunesItemExtensionBuilder,
    ITunesOwnerBuilder,
};
use rss::extension::{Extension, ExtensionBuilder, ExtensionMap};
use rss::{
    Category, Channel, ChannelBuilder, EnclosureBuilder, GuidBuilder, ImageBuilder, Item,
    ItemBuilder, SourceBuilder,
};

use anypod_core::{Download, DownloadStatus, Feed};
use anypod_db::Database;
use anypod_util::format_itunes_duration;

use crate::filestore::FileStore;
use crate::paths::PathManager;
use crate::PipelineError;

const GENERATOR: &str = "AnyPod: https://github.com/thurstonsan/anypod";
const TTL_MINUTES: i64 = 60;

/// Generates and persists a feed's RSS XML.
pub struct RssGenerator {
    db: Database,
    paths: PathManager,
    filestore: FileStore,
}

impl RssGenerator {
    #[must_use]
    pub const fn new(db: Database, paths: PathManager, filestore: FileStore) -> Self {
        Self {
            db,
            paths,
            filestore,
        }
    }

    /// Generate the feed XML, write it to disk, and record the generation
    /// timestamp. Returns the number of episodes emitted.
    ///
    /// # Errors
    /// Returns `PipelineError::RssGeneration` when required metadata is
    /// missing or rendering/persisting fails
    pub async fn generate_feed(&self, feed_id: &str) -> Result<usize, PipelineError> {
        let feed = self
            .db
            .feeds()
            .get_feed_by_id(feed_id)
            .await
            .map_err(|err| PipelineError::database(feed_id, err))?;

        // newest first
        let downloads = self
            .db
            .downloads()
            .get_downloads_by_status(DownloadStatus::Downloaded, Some(feed_id), None, -1, 0)
            .await
            .map_err(|err| PipelineError::database(feed_id, err))?;

        let channel = build_channel(&self.paths, &feed, &downloads)?;

        let mut xml = Vec::new();
        xml.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        channel
            .pretty_write_to(&mut xml, b' ', 2)
            .map_err(|err| PipelineError::RssGeneration {
                feed_id: feed_id.to_string(),
                message: format!("failed to serialize feed XML: {err}"),
            })?;

        let xml_path = self.paths.feed_xml_path(feed_id).await?;
        self.filestore.write_atomic(&xml_path, &xml).await?;

        self.db
            .feeds()
            .mark_rss_generated(feed_id)
            .await
            .map_err(|err| PipelineError::database(feed_id, err))?;

        tracing::info!(feed_id, num_episodes = downloads.len(), "RSS feed XML generated");
        Ok(downloads.len())
    }
}

fn build_channel(
    paths: &PathManager,
    feed: &Feed,
    downloads: &[Download],
) -> Result<Channel, PipelineError> {
    let title = feed
        .title
        .clone()
        .ok_or_else(|| PipelineError::RssGeneration {
            feed_id: feed.id.clone(),
            message: "feed title is required when creating an RSS feed".to_string(),
        })?;
    let description = feed.description.clone().unwrap_or_else(|| title.clone());

    let image_url = hosted_feed_image_url(paths, feed);

    let mut itunes = ITunesChannelExtensionBuilder::default();
    itunes
        .summary(Some(description.clone()))
        .explicit(Some(feed.explicit.rss_str().to_string()))
        .r#type(Some(feed.podcast_type.rss_str().to_string()))
        .categories(
            feed.category
                .itunes_list()
                .into_iter()
                .map(|(main, sub)| {
                    let mut category = ITunesCategoryBuilder::default();
                    category.text(main);
                    if let Some(sub) = sub {
                        category.subcategory(Some(Box::new(
                            ITunesCategoryBuilder::default().text(sub).build(),
                        )));
                    }
                    category.build()
                })
                .collect::<Vec<_>>(),
        );
    if let Some(subtitle) = &feed.subtitle {
        itunes.subtitle(Some(subtitle.clone()));
    }
    if let Some(url) = &image_url {
        itunes.image(Some(url.clone()));
    }
    if let Some(author) = &feed.author {
        itunes.author(Some(author.clone()));
        if let Some(email) = &feed.author_email {
            itunes.owner(Some(
                ITunesOwnerBuilder::default()
                    .name(Some(author.clone()))
                    .email(Some(email.clone()))
                    .build(),
            ));
        }
    }

    let items = downloads
        .iter()
        .map(|download| build_item(paths, feed, download))
        .collect::<Result<Vec<_>, _>>()?;

    let mut channel = ChannelBuilder::default();
    channel
        .title(title.clone())
        .link(feed.source_url.clone())
        .description(description)
        .language(Some(feed.language.clone().unwrap_or_else(|| "en".to_string())))
        .categories(
            feed.category
                .rss_terms()
                .into_iter()
                .map(|term| Category {
                    name: term,
                    domain: None,
                })
                .collect::<Vec<_>>(),
        )
        .generator(Some(GENERATOR.to_string()))
        .ttl(Some(TTL_MINUTES.to_string()))
        .last_build_date(Some(chrono::Utc::now().to_rfc2822()))
        .itunes_ext(Some(itunes.build()))
        .items(items);

    // self link via atom:link rel=self
    channel.atom_ext(Some(rss::extension::atom::AtomExtension {
        links: vec![rss::extension::atom::Link {
            href: paths.feed_url(&feed.id),
            rel: "self".to_string(),
            mime_type: Some("application/rss+xml".to_string()),
            ..rss::extension::atom::Link::default()
        }],
    }));

    if let Some(newest) = downloads.first() {
        channel.pub_date(Some(newest.published.to_rfc2822()));
    }
    if let Some(url) = image_url {
        channel.image(Some(
            ImageBuilder::default()
                .url(url.clone())
                .title(title)
                .link(feed.source_url.clone())
                .build(),
        ));
    }

    Ok(channel.build())
}

fn build_item(
    paths: &PathManager,
    feed: &Feed,
    download: &Download,
) -> Result<Item, PipelineError> {
    let description = download
        .description
        .clone()
        .unwrap_or_else(|| download.title.clone());

    let media_url = paths.media_file_url(&download.feed_id, &download.id, &download.ext);
    let enclosure = EnclosureBuilder::default()
        .url(media_url)
        .length(download.filesize.to_string())
        .mime_type(download.mime_type.clone())
        .build();

    let mut itunes = ITunesItemExtensionBuilder::default();
    itunes
        .summary(Some(description.clone()))
        .duration(Some(format_itunes_duration(download.duration)))
        .episode_type(Some("full".to_string()));
    if let Some(url) = item_image_url(paths, download) {
        itunes.image(Some(url));
    }

    let mut item = ItemBuilder::default();
    item.title(Some(download.title.clone()))
        .link(Some(download.source_url.clone()))
        .description(Some(description))
        .guid(Some(
            GuidBuilder::default()
                .value(download.source_url.clone())
                .permalink(true)
                .build(),
        ))
        .pub_date(Some(download.published.to_rfc2822()))
        .source(Some(
            SourceBuilder::default()
                .url(feed.source_url.clone())
                .title(feed.title.clone())
                .build(),
        ))
        .enclosure(Some(enclosure))
        .itunes_ext(Some(itunes.build()))
        .extensions(itunes_title_extension(&download.title));

    Ok(item.build())
}

/// The itunes item extension has no title field; emit `itunes:title` through
/// the generic extension map.
fn itunes_title_extension(title: &str) -> ExtensionMap {
    let extension = ExtensionBuilder::default()
        .name("itunes:title".to_string())
        .value(Some(title.to_string()))
        .build();

    let mut by_name: BTreeMap<String, Vec<Extension>> = BTreeMap::new();
    by_name.insert("title".to_string(), vec![extension]);
    let mut map = ExtensionMap::default();
    map.insert("itunes".to_string(), by_name);
    map
}

fn hosted_feed_image_url(paths: &PathManager, feed: &Feed) -> Option<String> {
    feed.image_ext
        .as_ref()
        .map(|ext| paths.image_url(&feed.id, None, ext))
        .or_else(|| feed.remote_image_url.clone())
}

/// Prefer the hosted thumbnail; fall back to the remote URL, skipping
/// anything that is not http(s).
fn item_image_url(paths: &PathManager, download: &Download) -> Option<String> {
    if let Some(ext) = &download.thumbnail_ext {
        return Some(paths.image_url(&download.feed_id, Some(&download.id), ext));
    }
    match &download.remote_thumbnail_url {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
            Some(url.clone())
        }
        Some(url) => {
            tracing::warn!(
                feed_id = download.feed_id,
                download_id = download.id,
                url,
                "skipping invalid thumbnail URL"
            );
            None
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use anypod_core::SourceType;

    use super::*;

    fn test_feed() -> Feed {
        let mut feed = Feed::new(
            "f1".to_string(),
            "https://www.youtube.com/@somechannel".to_string(),
            chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        feed.source_type = SourceType::Channel;
        feed.title = Some("Some Channel".to_string());
        feed.description = Some("A channel about things".to_string());
        feed.author = Some("Someone".to_string());
        feed.author_email = Some("someone@example.com".to_string());
        feed
    }

    fn test_download(id: &str, day: u32) -> Download {
        Download {
            feed_id: "f1".to_string(),
            id: id.to_string(),
            source_url: format!("https://www.youtube.com/watch?v={id}"),
            title: format!("Episode {id}"),
            published: chrono::Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap(),
            ext: "m4a".to_string(),
            mime_type: "audio/mp4".to_string(),
            filesize: 123_456,
            duration: 620,
            status: DownloadStatus::Downloaded,
            discovered_at: None,
            updated_at: None,
            downloaded_at: None,
            remote_thumbnail_url: Some("https://img.example.com/t.jpg".to_string()),
            thumbnail_ext: None,
            description: Some("An episode".to_string()),
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

    fn paths() -> PathManager {
        PathManager::new("/data", "https://pods.example.com")
    }

    #[test]
    fn every_downloaded_item_gets_one_enclosure() {
        let downloads = vec![test_download("v2", 2), test_download("v1", 1)];
        let channel = build_channel(&paths(), &test_feed(), &downloads).unwrap();

        assert_eq!(channel.items.len(), 2);
        let enclosure = channel.items[0].enclosure.as_ref().unwrap();
        assert_eq!(enclosure.url, "https://pods.example.com/media/f1/v2.m4a");
        assert_eq!(enclosure.length, "123456");
        assert_eq!(enclosure.mime_type, "audio/mp4");
    }

    #[test]
    fn channel_carries_itunes_metadata() {
        let channel = build_channel(&paths(), &test_feed(), &[]).unwrap();
        let itunes = channel.itunes_ext.as_ref().unwrap();
        assert_eq!(itunes.explicit.as_deref(), Some("no"));
        assert_eq!(itunes.r#type.as_deref(), Some("episodic"));
        assert_eq!(itunes.author.as_deref(), Some("Someone"));
        assert_eq!(
            itunes.owner.as_ref().and_then(|o| o.email.as_deref()),
            Some("someone@example.com")
        );
        assert_eq!(channel.generator.as_deref(), Some(GENERATOR));
        assert_eq!(channel.ttl.as_deref(), Some("60"));
        assert_eq!(channel.language.as_deref(), Some("en"));
    }

    #[test]
    fn item_duration_is_hh_mm_ss() {
        let downloads = vec![test_download("v1", 1)];
        let channel = build_channel(&paths(), &test_feed(), &downloads).unwrap();
        let itunes = channel.items[0].itunes_ext.as_ref().unwrap();
        assert_eq!(itunes.duration.as_deref(), Some("00:10:20"));
        assert_eq!(itunes.episode_type.as_deref(), Some("full"));
    }

    #[test]
    fn hosted_thumbnail_wins_over_remote() {
        let mut download = test_download("v1", 1);
        download.thumbnail_ext = Some("jpg".to_string());
        assert_eq!(
            item_image_url(&paths(), &download).as_deref(),
            Some("https://pods.example.com/images/f1/downloads/v1.jpg")
        );

        download.thumbnail_ext = None;
        assert_eq!(
            item_image_url(&paths(), &download).as_deref(),
            Some("https://img.example.com/t.jpg")
        );

        download.remote_thumbnail_url = Some("data:image/png;base64,xyz".to_string());
        assert_eq!(item_image_url(&paths(), &download), None);
    }

    #[test]
    fn missing_title_fails_generation() {
        let mut feed = test_feed();
        feed.title = None;
        assert!(build_channel(&paths(), &feed, &[]).is_err());
    }

    #[test]
    fn guid_is_permalink_source_url() {
        let downloads = vec![test_download("v1", 1)];
        let channel = build_channel(&paths(), &test_feed(), &downloads).unwrap();
        let guid = channel.items[0].guid.as_ref().unwrap();
        assert!(guid.permalink);
        assert_eq!(guid.value, "https://www.youtube.com/watch?v=v1");
    }
}
