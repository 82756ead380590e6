//! Shared data models for the thumbnail worker.
//!
//! This crate provides:
//! - Request/response wire types for the `/thumbnail` endpoint
//! - Cache-key derivation and thumbnail encoding constants
//! - Source URL normalization and public URL building

pub mod request;
pub mod thumbnail;
pub mod source_url;

pub use request::{ThumbnailRequest, ThumbnailResponse};
pub use thumbnail::{
    thumbnail_key, INPUT_NAME, OUTPUT_NAME, THUMBNAIL_CONTENT_TYPE, THUMBNAIL_KEY_PREFIX,
    THUMBNAIL_OFFSET, THUMBNAIL_SCALE_WIDTH,
};
pub use source_url::{build_public_url, normalize_video_url, video_key_from_url};
