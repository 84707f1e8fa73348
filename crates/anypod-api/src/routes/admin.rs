//! Admin endpoints for maintenance operations (private bind only)

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use anypod_core::DownloadStatus;
use anypod_pipeline::FeedConfig;
use anypod_util::is_valid_feed_id;

use crate::{ApiError, ApiState};

fn validated_feed_id(feed_id: &str) -> Result<&str, ApiError> {
    if is_valid_feed_id(feed_id) {
        Ok(feed_id)
    } else {
        Err(ApiError::validation("Invalid feed id"))
    }
}

fn configured_feed<'a>(
    state: &'a ApiState,
    feed_id: &str,
) -> Result<&'a FeedConfig, ApiError> {
    state
        .feed_configs
        .get(feed_id)
        .ok_or_else(|| ApiError::not_found("Feed not configured"))
}

#[derive(Serialize)]
pub struct RefreshFeedResponse {
    feed_id: String,
    message: String,
}

/// `POST /admin/feeds/{feed_id}/refresh` — trigger processing outside the
/// schedule. Works for scheduled and manual feeds.
pub async fn refresh_feed(
    State(state): State<Arc<ApiState>>,
    Path(feed_id): Path<String>,
) -> Result<Response, ApiError> {
    let feed_id = validated_feed_id(&feed_id)?;
    let feed_config = configured_feed(&state, feed_id)?;
    if !feed_config.enabled {
        return Err(ApiError::validation("Feed is disabled"));
    }
    state.db.feeds().get_feed_by_id(feed_id).await?;

    state
        .manual_runner
        .trigger(feed_id, feed_config.clone())
        .await;

    tracing::info!(feed_id, "feed refresh triggered");
    Ok((
        StatusCode::ACCEPTED,
        Json(RefreshFeedResponse {
            feed_id: feed_id.to_string(),
            message: "Feed processing triggered".to_string(),
        }),
    )
        .into_response())
}

#[derive(Serialize)]
pub struct ResetErrorsResponse {
    feed_id: String,
    reset_count: u64,
}

/// `POST /admin/feeds/{feed_id}/reset-errors` — requeue everything in ERROR.
pub async fn reset_errors(
    State(state): State<Arc<ApiState>>,
    Path(feed_id): Path<String>,
) -> Result<Json<ResetErrorsResponse>, ApiError> {
    let feed_id = validated_feed_id(&feed_id)?;
    state.db.feeds().get_feed_by_id(feed_id).await?;

    let reset_count = state
        .db
        .downloads()
        .requeue_downloads(feed_id, None, Some(DownloadStatus::Error))
        .await?;

    tracing::info!(feed_id, reset_count, "reset errors for feed");
    Ok(Json(ResetErrorsResponse {
        feed_id: feed_id.to_string(),
        reset_count,
    }))
}

#[derive(Deserialize)]
pub struct ManualDownloadRequest {
    url: String,
}

#[derive(Serialize)]
pub struct ManualDownloadResponse {
    feed_id: String,
    download_id: String,
    status: DownloadStatus,
    new: bool,
    message: String,
}

/// `POST /admin/feeds/{feed_id}/downloads` — accept a single URL for manual
/// processing.
pub async fn submit_manual_download(
    State(state): State<Arc<ApiState>>,
    Path(feed_id): Path<String>,
    Json(payload): Json<ManualDownloadRequest>,
) -> Result<Json<ManualDownloadResponse>, ApiError> {
    let feed_id = validated_feed_id(&feed_id)?;
    if payload.url.trim().is_empty() {
        return Err(ApiError::validation("url must not be empty"));
    }
    let feed_config = configured_feed(&state, feed_id)?;
    if !feed_config.enabled {
        return Err(ApiError::validation("Feed is disabled"));
    }
    if !feed_config.is_manual {
        return Err(ApiError::validation("Feed does not accept manual submissions"));
    }
    state.db.feeds().get_feed_by_id(feed_id).await?;

    let outcome = state
        .submissions
        .submit(feed_id, feed_config, &payload.url)
        .await?;

    if outcome.should_trigger {
        state
            .manual_runner
            .trigger(feed_id, feed_config.clone())
            .await;
    }

    Ok(Json(ManualDownloadResponse {
        feed_id: feed_id.to_string(),
        download_id: outcome.download_id,
        status: outcome.status,
        new: outcome.is_new,
        message: outcome.message,
    }))
}

#[derive(Deserialize)]
pub struct DownloadFieldsQuery {
    fields: Option<String>,
}

#[derive(Serialize)]
pub struct DownloadFieldsResponse {
    feed_id: String,
    download_id: String,
    download: serde_json::Map<String, serde_json::Value>,
}

/// Key columns are addressed in the path, not selectable as fields.
const EXCLUDED_FIELD_NAMES: &[&str] = &["feed_id", "id"];

/// `GET /admin/feeds/{feed_id}/downloads/{download_id}?fields=a,b`
pub async fn get_download_fields(
    State(state): State<Arc<ApiState>>,
    Path((feed_id, download_id)): Path<(String, String)>,
    Query(query): Query<DownloadFieldsQuery>,
) -> Result<Json<DownloadFieldsResponse>, ApiError> {
    let feed_id = validated_feed_id(&feed_id)?;

    let download = state
        .db
        .downloads()
        .get_download_by_id(feed_id, &download_id)
        .await?;

    let serde_json::Value::Object(mut all_fields) = serde_json::to_value(&download)
        .map_err(|err| ApiError::Internal(err.to_string()))?
    else {
        return Err(ApiError::Internal("download did not serialize to an object".into()));
    };
    for excluded in EXCLUDED_FIELD_NAMES {
        all_fields.remove(*excluded);
    }

    let selected = match query.fields.as_deref() {
        None => all_fields,
        Some(fields) => {
            let requested: BTreeSet<&str> = fields
                .split(',')
                .map(str::trim)
                .filter(|field| !field.is_empty())
                .collect();
            if requested.is_empty() {
                return Err(ApiError::validation("No fields specified"));
            }
            let invalid: Vec<&str> = requested
                .iter()
                .copied()
                .filter(|field| !all_fields.contains_key(*field))
                .collect();
            if !invalid.is_empty() {
                return Err(ApiError::validation(format!(
                    "Unsupported field(s) requested: {}",
                    invalid.join(", ")
                )));
            }
            all_fields
                .into_iter()
                .filter(|(key, _)| requested.contains(key.as_str()))
                .collect()
        }
    };

    Ok(Json(DownloadFieldsResponse {
        feed_id: feed_id.to_string(),
        download_id,
        download: selected,
    }))
}

/// `DELETE /admin/feeds/{feed_id}/downloads/{download_id}` — manual feeds
/// only; removes the row, regenerates the RSS, and unlinks files.
pub async fn delete_download(
    State(state): State<Arc<ApiState>>,
    Path((feed_id, download_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let feed_id = validated_feed_id(&feed_id)?;
    let feed_config = configured_feed(&state, feed_id)?;
    if !feed_config.is_manual {
        return Err(ApiError::validation(
            "Download deletion is only supported for manual feeds",
        ));
    }
    state.db.feeds().get_feed_by_id(feed_id).await?;

    let download = state
        .db
        .downloads()
        .delete_download(feed_id, &download_id)
        .await?;

    let rss_result = state.coordinator.regenerate_rss(feed_id).await;
    if !rss_result.overall_success {
        return Err(ApiError::Internal("Failed to regenerate RSS feed".into()));
    }

    match state
        .filestore
        .delete_media_file(feed_id, &download.id, &download.ext)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(feed_id, download_id, "download file missing during deletion");
        }
        Err(err) => return Err(ApiError::Internal(err.to_string())),
    }

    if let Some(thumbnail_ext) = &download.thumbnail_ext {
        match state
            .filestore
            .delete_image(feed_id, Some(&download.id), thumbnail_ext)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(feed_id, download_id, "thumbnail missing during deletion");
            }
            Err(err) => return Err(ApiError::Internal(err.to_string())),
        }
    }

    tracing::info!(feed_id, download_id, "download deleted for manual feed");
    Ok(StatusCode::NO_CONTENT)
}
