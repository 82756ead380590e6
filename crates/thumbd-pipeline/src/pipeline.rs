//! Thumbnail pipeline orchestrator.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, info, warn};

use thumbd_engine::EngineClient;
use thumbd_models::{
    build_public_url, normalize_video_url, thumbnail_key, INPUT_NAME, OUTPUT_NAME,
    THUMBNAIL_CONTENT_TYPE, THUMBNAIL_OFFSET, THUMBNAIL_SCALE_WIDTH,
};

use crate::error::{PipelineError, PipelineResult};
use crate::source::{SourceMode, SourceResolver};
use crate::store::ArtifactStore;

/// Counter incremented when an existing artifact short-circuits generation.
pub const CACHE_HITS_METRIC: &str = "thumbd_cache_hits_total";

/// Counter incremented when generation has to run.
pub const CACHE_MISSES_METRIC: &str = "thumbd_cache_misses_total";

/// Counter incremented per freshly persisted thumbnail.
pub const GENERATED_METRIC: &str = "thumbd_thumbnails_generated_total";

/// Pipeline configuration.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Public base prefixed onto cache keys in responses.
    pub public_base_url: Option<String>,
    /// Where source bytes come from.
    pub source_mode: SourceMode,
    /// Timeout passed to the engine's execute command. Default: none.
    pub exec_timeout: Option<Duration>,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            public_base_url: std::env::var("R2_PUBLIC_BASE_URL").ok().filter(|s| !s.is_empty()),
            source_mode: std::env::var("SOURCE_MODE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            exec_timeout: std::env::var("ENGINE_EXEC_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
        }
    }
}

/// Result of a successful generation request.
#[derive(Debug, Clone)]
pub struct ThumbnailOutcome {
    /// Public URL of the artifact.
    pub url: String,
    /// Whether the cache short-circuited (no engine contact).
    pub cached: bool,
}

/// Sequences authorize-free request handling: validate, cache-check,
/// resolve source, drive the engine, persist, respond.
pub struct ThumbnailPipeline {
    store: Arc<dyn ArtifactStore>,
    engine: Arc<EngineClient>,
    resolver: SourceResolver,
    config: PipelineConfig,
}

impl ThumbnailPipeline {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        engine: Arc<EngineClient>,
        config: PipelineConfig,
    ) -> Self {
        let resolver = SourceResolver::new(config.source_mode);
        Self {
            store,
            engine,
            resolver,
            config,
        }
    }

    /// The store backing this pipeline (readiness checks).
    pub fn store(&self) -> Arc<dyn ArtifactStore> {
        Arc::clone(&self.store)
    }

    /// The engine backing this pipeline.
    pub fn engine(&self) -> Arc<EngineClient> {
        Arc::clone(&self.engine)
    }

    /// Produce a thumbnail for a job, idempotently.
    ///
    /// The cache key is computed once and never mutated; if an artifact
    /// already exists for it, no source fetch and no engine command happen.
    pub async fn generate(
        &self,
        job_id: &str,
        video_url: Option<&str>,
    ) -> PipelineResult<ThumbnailOutcome> {
        let job_id = job_id.trim();
        if job_id.is_empty() {
            return Err(PipelineError::invalid_input("missing job id"));
        }
        let video_url = video_url
            .and_then(normalize_video_url)
            .ok_or_else(|| PipelineError::invalid_input("missing or malformed video URL"))?;

        let key = thumbnail_key(job_id);
        let url = build_public_url(self.config.public_base_url.as_deref(), &key);

        if self.store.exists(&key).await? {
            debug!(job_id, key, "thumbnail already generated");
            counter!(CACHE_HITS_METRIC).increment(1);
            return Ok(ThumbnailOutcome { url, cached: true });
        }
        counter!(CACHE_MISSES_METRIC).increment(1);

        let source = self.resolver.resolve(self.store.as_ref(), &video_url).await?;
        info!(job_id, bytes = source.len(), "generating thumbnail");

        let image = self.extract_frame(source).await?;

        self.store
            .put(&key, image, THUMBNAIL_CONTENT_TYPE)
            .await
            .map_err(|e| PipelineError::PersistFailed(e.to_string()))?;

        info!(job_id, key, "thumbnail stored");
        counter!(GENERATED_METRIC).increment(1);
        Ok(ThumbnailOutcome { url, cached: false })
    }

    /// Drive the engine: write input, extract one frame, read it back.
    ///
    /// The fixed temporary names rely on the engine session serializing all
    /// commands; parallel generation would need per-call unique names.
    async fn extract_frame(&self, source: Vec<u8>) -> PipelineResult<Vec<u8>> {
        self.engine.ensure_ready().await?;
        self.engine.write_file(INPUT_NAME, source).await?;

        let result = self.run_extraction().await;
        self.cleanup().await;
        result
    }

    async fn run_extraction(&self) -> PipelineResult<Vec<u8>> {
        let args: Vec<String> = vec![
            "-i".into(),
            INPUT_NAME.into(),
            "-ss".into(),
            THUMBNAIL_OFFSET.into(),
            "-frames:v".into(),
            "1".into(),
            "-vf".into(),
            format!("scale={}:-1", THUMBNAIL_SCALE_WIDTH),
            "-f".into(),
            "image2".into(),
            OUTPUT_NAME.into(),
        ];

        self.engine.exec(args, self.config.exec_timeout).await?;
        let image = self.engine.read_file(OUTPUT_NAME).await?;
        Ok(image)
    }

    /// Best-effort removal of the fixed temporary names. Failures here are
    /// logged, never fatal: the artifact is only persisted after a
    /// successful read-back, so no partial state can leak.
    async fn cleanup(&self) {
        for name in [INPUT_NAME, OUTPUT_NAME] {
            if let Err(err) = self.engine.delete_file(name).await {
                warn!(name, error = %err, "failed to delete engine temp file");
            }
        }
    }
}
