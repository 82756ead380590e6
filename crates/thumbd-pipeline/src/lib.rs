//! Idempotent thumbnail generation pipeline.
//!
//! Sequences cache-check, source resolution, engine-driven frame extraction
//! and artifact persistence. The cache key doubles as the idempotency
//! marker: once an artifact exists for a job, the pipeline never generates
//! again for that key.

pub mod error;
pub mod pipeline;
pub mod source;
pub mod store;

pub use error::{PipelineError, PipelineResult};
pub use pipeline::{
    PipelineConfig, ThumbnailOutcome, ThumbnailPipeline, CACHE_HITS_METRIC, CACHE_MISSES_METRIC,
    GENERATED_METRIC,
};
pub use source::{SourceMode, SourceResolver};
pub use store::{ArtifactStore, MemoryStore};
