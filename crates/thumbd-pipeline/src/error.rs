//! Pipeline error taxonomy.
//!
//! Every terminal failure of a generation request maps to one variant; the
//! HTTP layer translates variants to wire responses without ever seeing
//! engine- or storage-native error shapes.

use thiserror::Error;
use thumbd_engine::EngineError;
use thumbd_storage::StorageError;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Terminal outcomes of a thumbnail request.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("source video not found: {0}")]
    SourceNotFound(String),

    #[error("failed to fetch source video: {0}")]
    SourceFetchFailed(String),

    #[error("engine not loaded")]
    NotLoaded,

    #[error("generation cancelled")]
    Cancelled,

    #[error("engine session terminated")]
    Terminated,

    #[error("engine timed out after {0} seconds")]
    EngineTimeout(u64),

    #[error("engine execution failed: {0}")]
    EngineExecutionFailed(String),

    #[error("failed to persist artifact: {0}")]
    PersistFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<EngineError> for PipelineError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotLoaded => Self::NotLoaded,
            EngineError::Cancelled => Self::Cancelled,
            EngineError::Terminated | EngineError::ChannelClosed => Self::Terminated,
            EngineError::Timeout(secs) => Self::EngineTimeout(secs),
            EngineError::ExecFailed { message, .. } => Self::EngineExecutionFailed(message),
            other => Self::EngineExecutionFailed(other.to_string()),
        }
    }
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_mapping() {
        assert!(matches!(
            PipelineError::from(EngineError::Timeout(30)),
            PipelineError::EngineTimeout(30)
        ));
        assert!(matches!(
            PipelineError::from(EngineError::Cancelled),
            PipelineError::Cancelled
        ));
        assert!(matches!(
            PipelineError::from(EngineError::Terminated),
            PipelineError::Terminated
        ));
        assert!(matches!(
            PipelineError::from(EngineError::exec_failed(Some(1), "bad stream")),
            PipelineError::EngineExecutionFailed(_)
        ));
    }
}
