//! Tagged command/event types for the engine channel.
//!
//! Every command carries a correlation id that the engine echoes on its
//! direct reply. Log and progress events are unsolicited broadcasts and
//! carry no id.

use std::time::Duration;

use crate::error::EngineError;

/// Correlation id, unique for the lifetime of one engine session.
/// Monotonically allocated; never reused while its call is pending.
pub type CommandId = u64;

/// A command sent to the engine.
#[derive(Debug, Clone)]
pub struct Command {
    pub id: CommandId,
    pub kind: CommandKind,
}

/// Discrete operations the engine understands.
#[derive(Debug, Clone)]
pub enum CommandKind {
    /// Initialize the engine instance. Must complete before any other kind.
    Load,
    /// Run ffmpeg with the given arguments inside the engine's namespace.
    Exec {
        args: Vec<String>,
        timeout: Option<Duration>,
    },
    WriteFile { path: String, data: Vec<u8> },
    ReadFile { path: String },
    DeleteFile { path: String },
    CreateDir { path: String },
    ListDir { path: String },
    DeleteDir { path: String },
}

impl CommandKind {
    /// Stable name for logging and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Load => "load",
            CommandKind::Exec { .. } => "exec",
            CommandKind::WriteFile { .. } => "write_file",
            CommandKind::ReadFile { .. } => "read_file",
            CommandKind::DeleteFile { .. } => "delete_file",
            CommandKind::CreateDir { .. } => "create_dir",
            CommandKind::ListDir { .. } => "list_dir",
            CommandKind::DeleteDir { .. } => "delete_dir",
        }
    }
}

/// Successful reply payloads.
#[derive(Debug, Clone)]
pub enum Reply {
    /// The engine finished initializing.
    Loaded,
    /// An exec run completed with the given exit code.
    Done { exit_code: i32 },
    /// File contents from `ReadFile`.
    Data(Vec<u8>),
    /// Directory entries from `ListDir`.
    Entries(Vec<String>),
    /// Acknowledgement with no payload.
    Unit,
}

/// Engine-native failure attached to a direct reply.
#[derive(Debug, Clone)]
pub enum EngineFault {
    /// A command other than `Load` arrived before initialization.
    NotLoaded,
    /// ffmpeg exited non-zero or could not be run.
    ExecFailed {
        exit_code: Option<i32>,
        message: String,
    },
    /// The per-command timeout elapsed; the process was killed.
    TimedOut { secs: u64 },
    /// Filesystem operation failed inside the engine namespace.
    Io(String),
}

impl From<EngineFault> for EngineError {
    fn from(fault: EngineFault) -> Self {
        match fault {
            EngineFault::NotLoaded => EngineError::NotLoaded,
            EngineFault::ExecFailed { exit_code, message } => {
                EngineError::ExecFailed { exit_code, message }
            }
            EngineFault::TimedOut { secs } => EngineError::Timeout(secs),
            EngineFault::Io(msg) => EngineError::Io(msg),
        }
    }
}

/// Progress snapshot parsed from the engine's transcode output.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    /// Current output timestamp in milliseconds.
    pub out_time_ms: i64,
    /// Frames emitted so far.
    pub frame: u64,
    /// Whether the run reported completion.
    pub done: bool,
}

/// Events arriving from the engine. Delivery order is not guaranteed to
/// match send order.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Direct reply to the command with the matching id.
    Reply {
        id: CommandId,
        outcome: Result<Reply, EngineFault>,
    },
    /// Unsolicited log line; fanned out to listeners, resolves no call.
    Log { message: String },
    /// Unsolicited progress update; fanned out to listeners.
    Progress { progress: Progress },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_normalization() {
        assert!(matches!(
            EngineError::from(EngineFault::NotLoaded),
            EngineError::NotLoaded
        ));
        assert!(matches!(
            EngineError::from(EngineFault::TimedOut { secs: 30 }),
            EngineError::Timeout(30)
        ));
        match EngineError::from(EngineFault::ExecFailed {
            exit_code: Some(1),
            message: "boom".into(),
        }) {
            EngineError::ExecFailed { exit_code, message } => {
                assert_eq!(exit_code, Some(1));
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_command_kind_names() {
        assert_eq!(CommandKind::Load.name(), "load");
        assert_eq!(
            CommandKind::Exec {
                args: vec![],
                timeout: None
            }
            .name(),
            "exec"
        );
    }
}
