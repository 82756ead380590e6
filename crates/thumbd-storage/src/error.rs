//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    /// Whether this error means the key simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found_only_matches_not_found() {
        assert!(StorageError::not_found("thumbnails/job.jpg").is_not_found());
        assert!(!StorageError::config_error("R2_BUCKET_NAME not set").is_not_found());
        assert!(!StorageError::upload_failed("connection reset").is_not_found());
        assert!(!StorageError::DownloadFailed("timed out".to_string()).is_not_found());
        assert!(!StorageError::AwsSdk("dispatch failure".to_string()).is_not_found());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = StorageError::not_found("videos/job-1.mp4");
        assert_eq!(err.to_string(), "Object not found: videos/job-1.mp4");

        let err = StorageError::config_error("R2_ENDPOINT_URL not set");
        assert_eq!(
            err.to_string(),
            "Failed to configure storage client: R2_ENDPOINT_URL not set"
        );
    }
}
