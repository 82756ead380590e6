//! Engine error taxonomy.
//!
//! Engine-native faults, timeouts and cancellation are normalized here; the
//! pipeline never inspects raw engine replies.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the engine channel, dispatcher and lifecycle.
///
/// `Clone` is required so a single failed initialization can be observed by
/// every caller sharing the init future.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("engine is not loaded, call ensure_ready() first")]
    NotLoaded,

    #[error("call cancelled by caller")]
    Cancelled,

    #[error("engine session terminated while call was pending")]
    Terminated,

    #[error("engine command timed out after {0} seconds")]
    Timeout(u64),

    #[error("engine execution failed (exit code {exit_code:?}): {message}")]
    ExecFailed {
        exit_code: Option<i32>,
        message: String,
    },

    #[error("engine protocol error: {0}")]
    Protocol(String),

    #[error("engine channel closed")]
    ChannelClosed,

    #[error("failed to start engine: {0}")]
    Spawn(String),

    #[error("engine I/O error: {0}")]
    Io(String),
}

impl EngineError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::Spawn(msg.into())
    }

    pub fn exec_failed(exit_code: Option<i32>, message: impl Into<String>) -> Self {
        Self::ExecFailed {
            exit_code,
            message: message.into(),
        }
    }
}
