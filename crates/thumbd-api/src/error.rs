//! API error types.
//!
//! Error bodies are part of the worker's contract with its callers: each
//! variant renders one fixed `error` string, and only internal failures
//! carry a `detail` field.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use thumbd_pipeline::PipelineError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Missing jobId or videoUrl")]
    MissingFields,

    #[error("Video object not found in R2")]
    SourceNotFound,

    #[error("Failed to download video")]
    SourceFetchFailed,

    #[error("Internal worker error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::MissingFields => StatusCode::BAD_REQUEST,
            ApiError::SourceNotFound => StatusCode::NOT_FOUND,
            ApiError::SourceFetchFailed => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "Unauthorized",
            ApiError::MissingFields => "Missing jobId or videoUrl",
            ApiError::SourceNotFound => "Video object not found in R2",
            ApiError::SourceFetchFailed => "Failed to download video",
            ApiError::Internal(_) => "Internal worker error",
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidInput(_) => ApiError::MissingFields,
            PipelineError::SourceNotFound(_) => ApiError::SourceNotFound,
            PipelineError::SourceFetchFailed(_) => ApiError::SourceFetchFailed,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = match &self {
            ApiError::Internal(detail) => Some(detail.clone()),
            _ => None,
        };

        let body = ErrorResponse {
            error: self.public_message(),
            detail,
        };

        (status, Json(body)).into_response()
    }
}
