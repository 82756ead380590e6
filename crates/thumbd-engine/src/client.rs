//! Typed engine client.
//!
//! Wraps the session and dispatcher behind typed calls so callers never
//! build raw protocol commands. One client per process; all commands for
//! all concurrent requests are serialized through its single engine session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::dispatcher::{Dispatcher, ListenerId};
use crate::error::{EngineError, EngineResult};
use crate::process::{spawn_engine, EngineConfig};
use crate::protocol::{CommandKind, EngineEvent, Progress, Reply};
use crate::session::EngineSession;
use crate::transport::EngineTransport;

/// Factory producing a fresh transport + event stream per session.
pub type TransportFactory = Arc<
    dyn Fn() -> EngineResult<(
            Box<dyn EngineTransport>,
            mpsc::UnboundedReceiver<EngineEvent>,
        )> + Send
        + Sync,
>;

/// High-level handle to the engine.
pub struct EngineClient {
    factory: TransportFactory,
    session: EngineSession,
}

impl EngineClient {
    /// Client backed by the ffmpeg process worker.
    pub fn new(config: EngineConfig) -> Self {
        let factory: TransportFactory = Arc::new(move || {
            let (transport, events) = spawn_engine(config.clone())?;
            Ok((Box::new(transport) as Box<dyn EngineTransport>, events))
        });
        Self::with_transport_factory(factory)
    }

    /// Client over an arbitrary transport (used by tests).
    pub fn with_transport_factory(factory: TransportFactory) -> Self {
        Self {
            factory,
            session: EngineSession::new(),
        }
    }

    /// Initialize the engine if needed. Safe to race: initialization runs
    /// exactly once per session.
    pub async fn ensure_ready(&self) -> EngineResult<()> {
        self.dispatcher().await.map(|_| ())
    }

    /// Whether the session is initialized.
    pub fn is_ready(&self) -> bool {
        self.session.is_ready()
    }

    async fn dispatcher(&self) -> EngineResult<Arc<Dispatcher>> {
        let factory = Arc::clone(&self.factory);
        self.session
            .ensure_ready(move || async move {
                let (transport, events) = factory()?;
                let dispatcher = Arc::new(Dispatcher::new(transport, events));
                match dispatcher.dispatch(CommandKind::Load, None).await? {
                    Reply::Loaded => Ok(dispatcher),
                    other => Err(EngineError::protocol(format!(
                        "unexpected load reply: {other:?}"
                    ))),
                }
            })
            .await
    }

    async fn call(&self, kind: CommandKind) -> EngineResult<Reply> {
        self.dispatcher().await?.dispatch(kind, None).await
    }

    /// Run ffmpeg with the given arguments.
    pub async fn exec(&self, args: Vec<String>, timeout: Option<Duration>) -> EngineResult<()> {
        match self.call(CommandKind::Exec { args, timeout }).await? {
            Reply::Done { .. } => Ok(()),
            other => Err(EngineError::protocol(format!("unexpected exec reply: {other:?}"))),
        }
    }

    /// Run ffmpeg with a caller-supplied cancel signal. Firing the signal
    /// rejects only this call.
    pub async fn exec_with_cancel(
        &self,
        args: Vec<String>,
        timeout: Option<Duration>,
        cancel: watch::Receiver<bool>,
    ) -> EngineResult<()> {
        let dispatcher = self.dispatcher().await?;
        match dispatcher
            .dispatch(CommandKind::Exec { args, timeout }, Some(cancel))
            .await?
        {
            Reply::Done { .. } => Ok(()),
            other => Err(EngineError::protocol(format!("unexpected exec reply: {other:?}"))),
        }
    }

    pub async fn write_file(&self, path: &str, data: Vec<u8>) -> EngineResult<()> {
        match self
            .call(CommandKind::WriteFile {
                path: path.to_string(),
                data,
            })
            .await?
        {
            Reply::Unit => Ok(()),
            other => Err(EngineError::protocol(format!("unexpected reply: {other:?}"))),
        }
    }

    pub async fn read_file(&self, path: &str) -> EngineResult<Vec<u8>> {
        match self
            .call(CommandKind::ReadFile {
                path: path.to_string(),
            })
            .await?
        {
            Reply::Data(data) => Ok(data),
            other => Err(EngineError::protocol(format!("unexpected reply: {other:?}"))),
        }
    }

    pub async fn delete_file(&self, path: &str) -> EngineResult<()> {
        match self
            .call(CommandKind::DeleteFile {
                path: path.to_string(),
            })
            .await?
        {
            Reply::Unit => Ok(()),
            other => Err(EngineError::protocol(format!("unexpected reply: {other:?}"))),
        }
    }

    pub async fn create_dir(&self, path: &str) -> EngineResult<()> {
        match self
            .call(CommandKind::CreateDir {
                path: path.to_string(),
            })
            .await?
        {
            Reply::Unit => Ok(()),
            other => Err(EngineError::protocol(format!("unexpected reply: {other:?}"))),
        }
    }

    pub async fn list_dir(&self, path: &str) -> EngineResult<Vec<String>> {
        match self
            .call(CommandKind::ListDir {
                path: path.to_string(),
            })
            .await?
        {
            Reply::Entries(entries) => Ok(entries),
            other => Err(EngineError::protocol(format!("unexpected reply: {other:?}"))),
        }
    }

    pub async fn delete_dir(&self, path: &str) -> EngineResult<()> {
        match self
            .call(CommandKind::DeleteDir {
                path: path.to_string(),
            })
            .await?
        {
            Reply::Unit => Ok(()),
            other => Err(EngineError::protocol(format!("unexpected reply: {other:?}"))),
        }
    }

    /// Register a log listener on the live session.
    pub fn on_log(
        &self,
        listener: impl Fn(&str) + Send + Sync + 'static,
    ) -> EngineResult<ListenerId> {
        match self.session.dispatcher() {
            Some(dispatcher) => Ok(dispatcher.on_log(listener)),
            None => Err(EngineError::NotLoaded),
        }
    }

    /// Register a progress listener on the live session.
    pub fn on_progress(
        &self,
        listener: impl Fn(&Progress) + Send + Sync + 'static,
    ) -> EngineResult<ListenerId> {
        match self.session.dispatcher() {
            Some(dispatcher) => Ok(dispatcher.on_progress(listener)),
            None => Err(EngineError::NotLoaded),
        }
    }

    /// Tear down the session: pending calls resolve with `Terminated` and
    /// the next `ensure_ready` initializes a fresh engine.
    pub fn shutdown(&self) {
        if let Some(dispatcher) = self.session.reset() {
            dispatcher.shutdown();
        }
    }
}
