//! Daemon startup: wire everything, reconcile, schedule, serve

use std::sync::Arc;

use color_eyre::eyre::{Result, eyre};
use tokio::sync::Semaphore;

use anypod_api::{ApiState, admin_router, public_router};
use anypod_db::Database;
use anypod_fetch::{Fetcher, FfMpeg, FfProbe, ProcessScope};
use anypod_pipeline::{
    AppSettings, Downloader, Enqueuer, FeedCoordinator, FeedScheduler, FileStore,
    ImageDownloader, ManualRunner, ManualSubmissionService, PathManager, Pruner, RssGenerator,
    StateReconciler, config,
};

pub async fn run(settings: AppSettings) -> Result<()> {
    tracing::info!(
        data_dir = %settings.data_dir.display(),
        base_url = settings.base_url,
        "starting anypod"
    );

    let feed_configs = config::load_feeds(&settings.config_file).await?;
    tracing::info!(feed_count = feed_configs.len(), "configuration loaded");

    // storage
    let paths = PathManager::new(settings.data_dir.clone(), &settings.base_url);
    let db_dir = paths.db_dir().await?;
    let db = Database::open(&db_dir).await?;
    let filestore = FileStore::new(paths.clone());

    // external tools
    let scope = ProcessScope::new();
    let fetcher = Arc::new(Fetcher::new(scope.clone(), settings.cookies_path.clone()));
    let ffprobe = FfProbe::new(scope.clone());
    let ffmpeg = FfMpeg::new(scope.clone());
    let images = Arc::new(ImageDownloader::new(paths.clone(), ffprobe.clone(), ffmpeg));

    // pipeline
    let enqueuer = Enqueuer::new(db.clone(), Arc::clone(&fetcher));
    let downloader = Downloader::new(
        db.clone(),
        Arc::clone(&fetcher),
        paths.clone(),
        filestore.clone(),
        Arc::clone(&images),
        ffprobe,
    );
    let pruner = Arc::new(Pruner::new(db.clone(), filestore.clone()));
    let rss = RssGenerator::new(db.clone(), paths.clone(), filestore.clone());
    let coordinator = Arc::new(FeedCoordinator::new(
        db.clone(),
        Arc::clone(&fetcher),
        paths.clone(),
        Arc::clone(&images),
        enqueuer,
        downloader,
        Pruner::new(db.clone(), filestore.clone()),
        rss,
    ));

    // reconcile configuration against persisted state
    let reconciler = StateReconciler::new(db.clone(), Arc::clone(&pruner));
    let ready_feeds = reconciler.reconcile_startup_state(&feed_configs).await?;
    tracing::info!(ready_feeds = ready_feeds.len(), "reconciliation finished");

    // concurrency cap shared by the scheduler and the manual runner
    let semaphore = Arc::new(Semaphore::new(settings.max_concurrent_feeds));

    let mut scheduler = FeedScheduler::new(
        &ready_feeds,
        &feed_configs,
        Arc::clone(&coordinator),
        Arc::clone(&semaphore),
    )
    .await?;
    scheduler.start().await?;

    let manual_runner = Arc::new(ManualRunner::new(
        Arc::clone(&coordinator),
        Arc::clone(&semaphore),
    ));
    let submissions = Arc::new(ManualSubmissionService::new(db.clone(), Arc::clone(&fetcher)));

    let api_state = Arc::new(ApiState {
        db: db.clone(),
        paths,
        filestore,
        feed_configs,
        coordinator,
        manual_runner: Arc::clone(&manual_runner),
        submissions,
        trusted_proxies: settings.trusted_proxies.clone(),
    });

    let public = tokio::spawn(anypod_api::serve(
        public_router(Arc::clone(&api_state)),
        settings.server_host.clone(),
        settings.server_port,
        shutdown_signal(),
    ));
    let admin = tokio::spawn(anypod_api::serve(
        admin_router(api_state),
        settings.admin_host.clone(),
        settings.admin_port,
        shutdown_signal(),
    ));

    shutdown_signal().await;
    tracing::info!("shutdown signal received, draining");

    scheduler.stop(true).await?;
    manual_runner.shutdown().await;
    scope.terminate_all().await;

    public
        .await
        .map_err(|err| eyre!("public server task failed: {err}"))??;
    admin
        .await
        .map_err(|err| eyre!("admin server task failed: {err}"))??;

    db.close().await;
    tracing::info!("anypod stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
    }
}
