//! Feed XML, media, and image serving

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;

use anypod_fetch::mime_type_for_ext;
use anypod_util::is_valid_feed_id;

use crate::{ApiError, ApiState};

const FEED_CACHE_CONTROL: &str = "public, max-age=300";

/// `GET /feeds/{feed_id}.xml`
pub async fn serve_feed(
    State(state): State<Arc<ApiState>>,
    Path(feed_id_xml): Path<String>,
) -> Result<Response, ApiError> {
    let feed_id = feed_id_xml
        .strip_suffix(".xml")
        .filter(|id| is_valid_feed_id(id))
        .ok_or_else(|| ApiError::not_found("Feed not found"))?;

    let path = state.paths.base_feeds_dir().join(format!("{feed_id}.xml"));
    let xml = match tokio::fs::read(&path).await {
        Ok(xml) => xml,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found("Feed not found"));
        }
        Err(err) => return Err(ApiError::Internal(err.to_string())),
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/rss+xml"),
            (header::CACHE_CONTROL, FEED_CACHE_CONTROL),
        ],
        xml,
    )
        .into_response())
}

/// `GET /media/{feed_id}/{filename}`
pub async fn serve_media(
    State(state): State<Arc<ApiState>>,
    Path((feed_id, filename)): Path<(String, String)>,
    connect_info: Result<ConnectInfo<std::net::SocketAddr>, <ConnectInfo<std::net::SocketAddr> as axum::extract::FromRequestParts<Arc<ApiState>>>::Rejection>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if !is_valid_feed_id(&feed_id) || filename.contains("..") {
        return Err(ApiError::not_found("File not found"));
    }

    tracing::debug!(
        feed_id,
        filename,
        client = client_ip(&state, connect_info.as_ref().ok(), &headers),
        "serving media file"
    );

    let path = state.paths.base_media_dir().join(&feed_id).join(&filename);
    let ext = filename.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    let mime_type = mime_type_for_ext(ext)
        .unwrap_or_else(|_| "application/octet-stream".to_string());

    stream_file(path, &mime_type).await
}

/// `GET /images/{*path}` — feed images and per-download thumbnails.
pub async fn serve_image(
    State(state): State<Arc<ApiState>>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    if path.split('/').any(|segment| segment.is_empty() || segment == "..") {
        return Err(ApiError::not_found("File not found"));
    }

    let full_path: PathBuf = state.paths.base_images_dir().join(&path);
    let ext = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    let mime_type = mime_type_for_ext(ext)
        .unwrap_or_else(|_| "application/octet-stream".to_string());

    stream_file(full_path, &mime_type).await
}

async fn stream_file(path: PathBuf, mime_type: &str) -> Result<Response, ApiError> {
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found("File not found"));
        }
        Err(err) => return Err(ApiError::Internal(err.to_string())),
    };

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, mime_type.to_string())],
        body,
    )
        .into_response())
}

/// Best-effort client address for logging; forwarded headers are honored
/// only when the peer is a configured trusted proxy.
fn client_ip(
    state: &ApiState,
    connect_info: Option<&ConnectInfo<std::net::SocketAddr>>,
    headers: &HeaderMap,
) -> String {
    let peer = connect_info.map(|info| info.0.ip().to_string());

    let trusted = match (&state.trusted_proxies, &peer) {
        (Some(proxies), Some(peer_ip)) => {
            proxies.iter().any(|proxy| peer_matches(peer_ip, proxy))
        }
        // unset means forwarded headers are not trusted at all
        _ => false,
    };

    if trusted {
        if let Some(forwarded) = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
        {
            return forwarded.trim().to_string();
        }
    }
    peer.unwrap_or_else(|| "<unknown>".to_string())
}

/// Exact-ip or prefix (network) match; full CIDR parsing is not needed for
/// log attribution.
fn peer_matches(peer_ip: &str, proxy: &str) -> bool {
    match proxy.split_once('/') {
        Some((network, _)) => {
            let prefix = network.rsplit_once('.').map_or(network, |(head, _)| head);
            peer_ip.starts_with(prefix)
        }
        None => peer_ip == proxy,
    }
}
