//! Thumbnail generation handler.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use tracing::{info, warn};

use thumbd_models::{ThumbnailRequest, ThumbnailResponse};

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const API_KEY_HEADER: &str = "x-api-key";

/// `POST /thumbnail`
///
/// Authorization is checked before the body is touched. The body is parsed
/// leniently: malformed JSON degrades into an empty request and fails
/// field validation, never a parser-shaped 4xx.
pub async fn generate_thumbnail(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ThumbnailResponse>> {
    authorize(&state.config, &headers)?;

    let request: ThumbnailRequest = serde_json::from_slice(&body).unwrap_or_default();

    let outcome = state
        .pipeline
        .generate(&request.job_id, request.video_url.as_deref())
        .await
        .map_err(|err| {
            warn!(job_id = %request.job_id, error = %err, "thumbnail generation failed");
            ApiError::from(err)
        })?;

    info!(job_id = %request.job_id, cached = outcome.cached, "thumbnail ready");
    Ok(Json(ThumbnailResponse::new(outcome.url)))
}

/// Constant-shape shared-secret check. A worker deployed without a secret
/// accepts nothing.
fn authorize(config: &ApiConfig, headers: &HeaderMap) -> ApiResult<()> {
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if config.api_key.is_empty() || provided.is_empty() || provided != config.api_key {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}
