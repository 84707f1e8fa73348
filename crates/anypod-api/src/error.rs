//! API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

use anypod_db::DbError;
use anypod_pipeline::PipelineError;

#[derive(Debug)]
pub enum ApiError {
    Validation { message: String },
    NotFound { message: String },
    Unavailable { message: String },
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { message } => write!(f, "Validation error: {message}"),
            Self::NotFound { message } => write!(f, "Not found: {message}"),
            Self::Unavailable { message } => write!(f, "Unavailable: {message}"),
            Self::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl ApiError {
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::Validation { message } => (StatusCode::BAD_REQUEST, "validation_error", message),
            Self::NotFound { message } => (StatusCode::NOT_FOUND, "not_found", message),
            Self::Unavailable { message } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unavailable", message)
            }
            Self::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Operation failed".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: error_type,
            message,
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::FeedNotFound { .. } => Self::not_found("Feed not found"),
            DbError::DownloadNotFound { .. } => Self::not_found("Download not found"),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::ManualSubmissionUnsupportedUrl { .. } => Self::validation(
                "Unable to process URL. Please verify it's a valid URL supported by the \
                 fetcher and that the content is accessible.",
            ),
            PipelineError::ManualSubmissionUnavailable { .. } => Self::Unavailable {
                message: "The provided URL is not yet available as downloadable media. This \
                          may be a scheduled premiere or live stream that hasn't started yet."
                    .to_string(),
            },
            PipelineError::Db(db) | PipelineError::Database { source: db, .. } => db.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}
