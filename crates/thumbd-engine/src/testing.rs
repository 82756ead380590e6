//! Test support: a scripted in-memory engine.
//!
//! Serves the full command protocol against an in-memory file map so
//! pipeline and API tests can run the real dispatcher and session code
//! without an ffmpeg binary. Exec behavior is scripted per engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::client::TransportFactory;
use crate::protocol::{Command, CommandKind, EngineEvent, EngineFault, Reply};
use crate::transport::{command_channel, EngineTransport};

/// What a scripted `Exec` does.
#[derive(Debug, Clone)]
pub enum ExecBehavior {
    /// Write `output` to the run's output file (last argument) and succeed.
    Succeed { output: Vec<u8> },
    /// Reply with a non-zero exit fault.
    Fail { exit_code: i32 },
    /// Reply with a timeout fault.
    TimeOut { secs: u64 },
}

/// Builder for scripted engine sessions, with command counters shared
/// across every session the factory creates.
pub struct ScriptedEngine {
    behavior: ExecBehavior,
    load_count: Arc<AtomicUsize>,
    exec_count: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    pub fn new(behavior: ExecBehavior) -> Self {
        Self {
            behavior,
            load_count: Arc::new(AtomicUsize::new(0)),
            exec_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many times any session of this engine was initialized.
    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }

    /// How many `Exec` commands any session of this engine served.
    pub fn exec_count(&self) -> usize {
        self.exec_count.load(Ordering::SeqCst)
    }

    /// Transport factory for `EngineClient::with_transport_factory`.
    pub fn factory(&self) -> TransportFactory {
        let behavior = self.behavior.clone();
        let load_count = Arc::clone(&self.load_count);
        let exec_count = Arc::clone(&self.exec_count);

        Arc::new(move || {
            let (transport, commands) = command_channel();
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            tokio::spawn(serve(
                commands,
                events_tx,
                behavior.clone(),
                Arc::clone(&load_count),
                Arc::clone(&exec_count),
            ));
            Ok((Box::new(transport) as Box<dyn EngineTransport>, events_rx))
        })
    }
}

async fn serve(
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<EngineEvent>,
    behavior: ExecBehavior,
    load_count: Arc<AtomicUsize>,
    exec_count: Arc<AtomicUsize>,
) {
    let mut loaded = false;
    let mut files: HashMap<String, Vec<u8>> = HashMap::new();

    while let Some(command) = commands.recv().await {
        let outcome = match command.kind {
            CommandKind::Load => {
                load_count.fetch_add(1, Ordering::SeqCst);
                loaded = true;
                Ok(Reply::Loaded)
            }
            _ if !loaded => Err(EngineFault::NotLoaded),
            CommandKind::Exec { args, .. } => {
                exec_count.fetch_add(1, Ordering::SeqCst);
                match &behavior {
                    ExecBehavior::Succeed { output } => {
                        let _ = events.send(EngineEvent::Log {
                            message: "scripted exec".to_string(),
                        });
                        match args.last() {
                            Some(out_name) => {
                                files.insert(out_name.clone(), output.clone());
                                Ok(Reply::Done { exit_code: 0 })
                            }
                            None => Err(EngineFault::ExecFailed {
                                exit_code: None,
                                message: "no output argument".to_string(),
                            }),
                        }
                    }
                    ExecBehavior::Fail { exit_code } => Err(EngineFault::ExecFailed {
                        exit_code: Some(*exit_code),
                        message: "scripted failure".to_string(),
                    }),
                    ExecBehavior::TimeOut { secs } => Err(EngineFault::TimedOut { secs: *secs }),
                }
            }
            CommandKind::WriteFile { path, data } => {
                files.insert(path, data);
                Ok(Reply::Unit)
            }
            CommandKind::ReadFile { path } => match files.get(&path) {
                Some(data) => Ok(Reply::Data(data.clone())),
                None => Err(EngineFault::Io(format!("no such file: {path}"))),
            },
            CommandKind::DeleteFile { path } => match files.remove(&path) {
                Some(_) => Ok(Reply::Unit),
                None => Err(EngineFault::Io(format!("no such file: {path}"))),
            },
            CommandKind::CreateDir { .. } => Ok(Reply::Unit),
            CommandKind::ListDir { .. } => Ok(Reply::Entries(files.keys().cloned().collect())),
            CommandKind::DeleteDir { .. } => {
                files.clear();
                Ok(Reply::Unit)
            }
        };

        if events
            .send(EngineEvent::Reply {
                id: command.id,
                outcome,
            })
            .is_err()
        {
            break;
        }
    }
}
