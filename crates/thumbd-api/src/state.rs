//! Application state.

use std::sync::Arc;

use thumbd_engine::{EngineClient, EngineConfig};
use thumbd_pipeline::{ArtifactStore, PipelineConfig, ThumbnailPipeline};
use thumbd_storage::R2Client;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Arc<ThumbnailPipeline>,
}

impl AppState {
    /// Create new application state from the environment.
    pub fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let storage: Arc<dyn ArtifactStore> = Arc::new(R2Client::from_env()?);
        let engine = Arc::new(EngineClient::new(EngineConfig::from_env()));
        let pipeline = Arc::new(ThumbnailPipeline::new(
            storage,
            engine,
            PipelineConfig::from_env(),
        ));

        Ok(Self { config, pipeline })
    }

    /// State over explicit parts (used by tests).
    pub fn with_pipeline(config: ApiConfig, pipeline: Arc<ThumbnailPipeline>) -> Self {
        Self { config, pipeline }
    }
}
