//! Thumbnail cache keys and extraction constants.

/// Storage key prefix for generated thumbnails.
pub const THUMBNAIL_KEY_PREFIX: &str = "sora-thumbnails";

/// Seek offset into the stream for the extracted frame.
pub const THUMBNAIL_OFFSET: &str = "00:00:01.000";

/// Target width; height follows the source aspect ratio.
pub const THUMBNAIL_SCALE_WIDTH: u32 = 512;

/// Content type of stored artifacts.
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

/// Fixed input name in the engine's file namespace.
///
/// Fixed names are safe only because the engine session serializes all
/// commands; parallel generation would need per-call unique names.
pub const INPUT_NAME: &str = "input.mp4";

/// Fixed output name in the engine's file namespace.
pub const OUTPUT_NAME: &str = "thumbnail.jpg";

/// Derive the cache key for a job. Deterministic and collision-free per
/// job id; its presence in the store marks the job as already generated.
pub fn thumbnail_key(job_id: &str) -> String {
    format!("{}/{}.jpg", THUMBNAIL_KEY_PREFIX, job_id)
}
