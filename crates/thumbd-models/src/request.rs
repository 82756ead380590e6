//! Wire types for the thumbnail endpoint.

use serde::{Deserialize, Serialize};

/// Request body for `POST /thumbnail`.
///
/// Both fields are optional on the wire; validation happens after parsing so
/// a malformed body degrades into the same 400 as a missing field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailRequest {
    /// Job identifier the thumbnail is generated for.
    #[serde(default)]
    pub job_id: String,
    /// Source video URL (download or co-located object lookup).
    #[serde(default)]
    pub video_url: Option<String>,
}

/// Success response for `POST /thumbnail`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailResponse {
    pub ok: bool,
    #[serde(rename = "r2ThumbnailUrl")]
    pub r2_thumbnail_url: String,
}

impl ThumbnailResponse {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            ok: true,
            r2_thumbnail_url: url.into(),
        }
    }
}
