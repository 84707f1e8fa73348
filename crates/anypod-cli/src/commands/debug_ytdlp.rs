//! Dump fetcher discovery and metadata for a URL

use std::sync::Arc;

use color_eyre::eyre::Result;

use anypod_fetch::{Fetcher, ProcessScope};
use anypod_pipeline::AppSettings;

const DEBUG_FEED_ID: &str = "debug";

pub async fn run(settings: &AppSettings, url: &str) -> Result<()> {
    let scope = ProcessScope::new();
    let fetcher = Arc::new(Fetcher::new(scope.clone(), settings.cookies_path.clone()));

    let (resolved_url, source_type) = fetcher.discover_source(DEBUG_FEED_ID, url).await?;
    println!("source_type: {source_type}");
    println!("resolved_url: {}", resolved_url.as_deref().unwrap_or(url));

    let downloads = fetcher
        .fetch_downloads_metadata(
            DEBUG_FEED_ID,
            resolved_url.as_deref().unwrap_or(url),
            &[],
            None,
            Some(5),
            None,
            &[],
        )
        .await?;

    println!("items: {}", downloads.len());
    for download in &downloads {
        println!("{}", serde_json::to_string_pretty(download)?);
    }

    scope.terminate_all().await;
    Ok(())
}
