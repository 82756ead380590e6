//! Cloudflare R2 storage client for the thumbnail cache.
//!
//! Presence of an object under a thumbnail's cache key is the idempotency
//! marker for "already generated"; there is no separate job-status record.

pub mod client;
pub mod error;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
