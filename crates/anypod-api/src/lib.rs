//! HTTP surface for Anypod
//!
//! Two routers: the public one serves feeds, media, images, and a health
//! check; the admin one exposes maintenance operations and is meant for a
//! private bind only.

mod error;
mod routes;
mod state;

pub use error::ApiError;
pub use state::ApiState;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Build the public router: feeds, media, images, health.
#[must_use]
pub fn public_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/feeds/{feed_id_xml}", get(routes::serve_feed))
        .route("/media/{feed_id}/{filename}", get(routes::serve_media))
        .route("/images/{*path}", get(routes::serve_image))
        .route("/api/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the admin router. Bind this privately.
#[must_use]
pub fn admin_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/admin/feeds/{feed_id}/refresh", post(routes::refresh_feed))
        .route(
            "/admin/feeds/{feed_id}/reset-errors",
            post(routes::reset_errors),
        )
        .route(
            "/admin/feeds/{feed_id}/downloads",
            post(routes::submit_manual_download),
        )
        .route(
            "/admin/feeds/{feed_id}/downloads/{download_id}",
            get(routes::get_download_fields).delete(routes::delete_download),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve a router until the shutdown future resolves.
///
/// # Errors
///
/// Returns the bind or serve error
pub async fn serve(
    router: Router,
    host: String,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = format!("{host}:{port}");
    tracing::info!(addr, "starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
