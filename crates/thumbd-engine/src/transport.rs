//! Send-only transport abstraction over the engine channel.
//!
//! Transmission is fire-and-forget; completion arrives later as an
//! [`EngineEvent`](crate::protocol::EngineEvent) carrying the command's id.
//! Keeping the dispatcher independent of the underlying transport (task,
//! process, network) is what makes it testable with a loopback channel.

use tokio::sync::mpsc;

use crate::error::{EngineError, EngineResult};
use crate::protocol::Command;

/// Fire-and-forget command transmission to one live engine instance.
pub trait EngineTransport: Send + Sync + 'static {
    fn send(&self, command: Command) -> EngineResult<()>;
}

/// Transport backed by an in-process mpsc channel to the engine worker.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Command>,
}

impl EngineTransport for ChannelTransport {
    fn send(&self, command: Command) -> EngineResult<()> {
        self.tx
            .send(command)
            .map_err(|_| EngineError::ChannelClosed)
    }
}

/// Create a command channel pair: the transport half and the receiver the
/// engine worker consumes.
pub fn command_channel() -> (ChannelTransport, mpsc::UnboundedReceiver<Command>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelTransport { tx }, rx)
}
