//! Asynchronous driver for the out-of-process ffmpeg engine.
//!
//! The engine is a single long-lived, stateful worker that accepts discrete
//! commands and emits discrete events on an unordered-delivery channel. This
//! crate restores request/response semantics on top of that channel:
//!
//! - [`protocol`] — tagged command/event types and correlation ids
//! - [`transport`] — the send-only channel abstraction
//! - [`dispatcher`] — pending-call table, per-call cancellation, broadcast
//!   fan-out and terminate semantics
//! - [`session`] — initialize-once, resettable lifecycle
//! - [`process`] — the ffmpeg-process-backed engine worker
//! - [`client`] — typed calls (`write_file`, `exec`, `read_file`, ...)

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod process;
pub mod protocol;
pub mod session;
pub mod testing;
pub mod transport;

pub use client::{EngineClient, TransportFactory};
pub use dispatcher::{Dispatcher, ListenerId, COMMANDS_TOTAL_METRIC};
pub use error::{EngineError, EngineResult};
pub use process::{spawn_engine, EngineConfig};
pub use protocol::{Command, CommandId, CommandKind, EngineEvent, EngineFault, Progress, Reply};
pub use session::EngineSession;
pub use transport::{command_channel, ChannelTransport, EngineTransport};
