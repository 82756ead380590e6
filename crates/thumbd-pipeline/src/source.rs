//! Source video resolution.
//!
//! Two deployment variants exist: download the video over HTTP, or look up
//! a co-located object in the same bucket under the key derived from the
//! URL path. The mode is fixed per deployment via configuration.

use std::str::FromStr;

use tracing::{debug, info};

use thumbd_models::video_key_from_url;

use crate::error::{PipelineError, PipelineResult};
use crate::store::ArtifactStore;

/// Where source bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    /// Co-located object in the bucket, key derived from the URL path.
    #[default]
    R2,
    /// Direct HTTP download of the URL.
    Http,
}

impl FromStr for SourceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "r2" => Ok(Self::R2),
            "http" => Ok(Self::Http),
            other => Err(format!("unknown source mode: {other}")),
        }
    }
}

/// Resolves raw video bytes for a normalized source URL.
pub struct SourceResolver {
    mode: SourceMode,
    http: reqwest::Client,
}

impl SourceResolver {
    pub fn new(mode: SourceMode) -> Self {
        Self {
            mode,
            http: reqwest::Client::new(),
        }
    }

    pub async fn resolve(
        &self,
        store: &dyn ArtifactStore,
        video_url: &str,
    ) -> PipelineResult<Vec<u8>> {
        match self.mode {
            SourceMode::R2 => self.resolve_r2(store, video_url).await,
            SourceMode::Http => self.resolve_http(video_url).await,
        }
    }

    async fn resolve_r2(
        &self,
        store: &dyn ArtifactStore,
        video_url: &str,
    ) -> PipelineResult<Vec<u8>> {
        let key = video_key_from_url(video_url)
            .ok_or_else(|| PipelineError::invalid_input(format!("unusable video URL: {video_url}")))?;
        debug!(key, "resolving source from bucket");

        match store.get(&key).await {
            Ok(Some(bytes)) => {
                info!(key, bytes = bytes.len(), "source object resolved");
                Ok(bytes)
            }
            Ok(None) => Err(PipelineError::SourceNotFound(key)),
            Err(err) => Err(PipelineError::SourceFetchFailed(err.to_string())),
        }
    }

    async fn resolve_http(&self, video_url: &str) -> PipelineResult<Vec<u8>> {
        debug!(url = video_url, "downloading source video");

        let response = self
            .http
            .get(video_url)
            .send()
            .await
            .map_err(|e| PipelineError::SourceFetchFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::SourceFetchFailed(format!(
                "upstream returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::SourceFetchFailed(e.to_string()))?;

        info!(url = video_url, bytes = bytes.len(), "source video downloaded");
        Ok(bytes.to_vec())
    }
}
