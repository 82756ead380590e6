//! FFmpeg-process-backed engine worker.
//!
//! The worker owns a private scratch directory that backs the engine's file
//! namespace and serves commands from the channel one at a time. `Exec` runs
//! the ffmpeg binary with the caller's arguments, parsing stderr into log
//! and progress broadcasts; everything else is filesystem plumbing inside
//! the scratch namespace.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as ProcessCommand;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::protocol::{Command, CommandKind, EngineEvent, EngineFault, Progress, Reply};
use crate::transport::{command_channel, ChannelTransport};

/// How many trailing stderr lines to keep for failure messages.
const STDERR_TAIL_LINES: usize = 20;

/// Engine worker configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Name or path of the ffmpeg binary.
    pub ffmpeg_bin: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            ffmpeg_bin: std::env::var("FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".to_string()),
        }
    }
}

/// Spawn an engine worker, returning the transport half and the event
/// stream. The worker ends when the transport is dropped.
pub fn spawn_engine(
    config: EngineConfig,
) -> EngineResult<(ChannelTransport, mpsc::UnboundedReceiver<EngineEvent>)> {
    let (transport, commands) = command_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_worker(config, commands, events_tx));
    Ok((transport, events_rx))
}

struct WorkerState {
    config: EngineConfig,
    ffmpeg: Option<PathBuf>,
    scratch: Option<TempDir>,
}

async fn run_worker(
    config: EngineConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<EngineEvent>,
) {
    let mut state = WorkerState {
        config,
        ffmpeg: None,
        scratch: None,
    };

    while let Some(command) = commands.recv().await {
        debug!(id = command.id, kind = command.kind.name(), "engine command");
        let outcome = state.handle(command.kind, &events).await;
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
    debug!("engine worker stopped");
}

impl WorkerState {
    async fn handle(
        &mut self,
        kind: CommandKind,
        events: &mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<Reply, EngineFault> {
        if let CommandKind::Load = kind {
            return self.load();
        }
        let scratch = match (&self.ffmpeg, &self.scratch) {
            (Some(_), Some(scratch)) => scratch.path().to_path_buf(),
            _ => return Err(EngineFault::NotLoaded),
        };

        match kind {
            CommandKind::Load => unreachable!("handled above"),
            CommandKind::Exec { args, timeout } => self.exec(&scratch, args, timeout, events).await,
            CommandKind::WriteFile { path, data } => {
                let path = resolve(&scratch, &path)?;
                tokio::fs::write(&path, data)
                    .await
                    .map_err(|e| EngineFault::Io(e.to_string()))?;
                Ok(Reply::Unit)
            }
            CommandKind::ReadFile { path } => {
                let path = resolve(&scratch, &path)?;
                let data = tokio::fs::read(&path)
                    .await
                    .map_err(|e| EngineFault::Io(e.to_string()))?;
                Ok(Reply::Data(data))
            }
            CommandKind::DeleteFile { path } => {
                let path = resolve(&scratch, &path)?;
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| EngineFault::Io(e.to_string()))?;
                Ok(Reply::Unit)
            }
            CommandKind::CreateDir { path } => {
                let path = resolve(&scratch, &path)?;
                tokio::fs::create_dir_all(&path)
                    .await
                    .map_err(|e| EngineFault::Io(e.to_string()))?;
                Ok(Reply::Unit)
            }
            CommandKind::ListDir { path } => {
                let path = resolve(&scratch, &path)?;
                let mut entries = Vec::new();
                let mut dir = tokio::fs::read_dir(&path)
                    .await
                    .map_err(|e| EngineFault::Io(e.to_string()))?;
                while let Some(entry) = dir
                    .next_entry()
                    .await
                    .map_err(|e| EngineFault::Io(e.to_string()))?
                {
                    entries.push(entry.file_name().to_string_lossy().to_string());
                }
                Ok(Reply::Entries(entries))
            }
            CommandKind::DeleteDir { path } => {
                let path = resolve(&scratch, &path)?;
                tokio::fs::remove_dir_all(&path)
                    .await
                    .map_err(|e| EngineFault::Io(e.to_string()))?;
                Ok(Reply::Unit)
            }
        }
    }

    fn load(&mut self) -> Result<Reply, EngineFault> {
        let ffmpeg = which::which(&self.config.ffmpeg_bin).map_err(|_| {
            EngineFault::ExecFailed {
                exit_code: None,
                message: format!("{} not found in PATH", self.config.ffmpeg_bin),
            }
        })?;
        let scratch = TempDir::new().map_err(|e| EngineFault::Io(e.to_string()))?;
        debug!(scratch = %scratch.path().display(), "engine loaded");
        self.ffmpeg = Some(ffmpeg);
        self.scratch = Some(scratch);
        Ok(Reply::Loaded)
    }

    async fn exec(
        &self,
        scratch: &Path,
        args: Vec<String>,
        timeout: Option<Duration>,
        events: &mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<Reply, EngineFault> {
        let ffmpeg = self.ffmpeg.as_ref().expect("checked by caller");
        debug!("running ffmpeg {}", args.join(" "));

        let mut child = ProcessCommand::new(ffmpeg)
            .arg("-hide_banner")
            .arg("-y")
            .arg("-nostats")
            .args(["-progress", "pipe:2"])
            .args(&args)
            .current_dir(scratch)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineFault::ExecFailed {
                exit_code: None,
                message: e.to_string(),
            })?;

        let stderr = child.stderr.take().expect("stderr not captured");
        let events = events.clone();
        let tail_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail: Vec<String> = Vec::new();
            let mut progress = Progress::default();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(update) = parse_progress_line(&line, &mut progress) {
                    let _ = events.send(EngineEvent::Progress { progress: update });
                } else {
                    let _ = events.send(EngineEvent::Log {
                        message: line.clone(),
                    });
                }
                tail.push(line);
                if tail.len() > STDERR_TAIL_LINES {
                    tail.remove(0);
                }
            }
            tail
        });

        let status = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(secs = limit.as_secs(), "ffmpeg timed out, killing process");
                    let _ = child.kill().await;
                    let _ = tail_task.await;
                    return Err(EngineFault::TimedOut {
                        secs: limit.as_secs(),
                    });
                }
            },
            None => child.wait().await,
        };

        let tail = tail_task.await.unwrap_or_default();
        let status = status.map_err(|e| EngineFault::ExecFailed {
            exit_code: None,
            message: e.to_string(),
        })?;

        if status.success() {
            Ok(Reply::Done { exit_code: 0 })
        } else {
            Err(EngineFault::ExecFailed {
                exit_code: status.code(),
                message: tail.join("\n"),
            })
        }
    }
}

/// Resolve an engine-namespace path inside the scratch directory.
/// Absolute paths and parent traversal are rejected.
fn resolve(scratch: &Path, path: &str) -> Result<PathBuf, EngineFault> {
    let relative = Path::new(path);
    let valid = !path.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !valid {
        return Err(EngineFault::Io(format!("invalid engine path: {path}")));
    }
    Ok(scratch.join(relative))
}

/// Parse one stderr line from `-progress pipe:2`-style output. Returns a
/// snapshot when the line closes a progress block.
fn parse_progress_line(line: &str, current: &mut Progress) -> Option<Progress> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => {
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = if key == "out_time_us" { us / 1000 } else { us };
            }
            None
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
            None
        }
        "progress" => {
            current.done = value == "end";
            Some(current.clone())
        }
        _ => None,
    }
}

/// Check that the configured ffmpeg binary is available.
pub fn check_ffmpeg(config: &EngineConfig) -> EngineResult<PathBuf> {
    which::which(&config.ffmpeg_bin)
        .map_err(|_| EngineError::spawn(format!("{} not found in PATH", config.ffmpeg_bin)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::EngineTransport;

    #[test]
    fn test_resolve_rejects_traversal() {
        let scratch = Path::new("/scratch");
        assert!(resolve(scratch, "input.mp4").is_ok());
        assert!(resolve(scratch, "sub/input.mp4").is_ok());
        assert!(resolve(scratch, "../escape").is_err());
        assert!(resolve(scratch, "/etc/passwd").is_err());
        assert!(resolve(scratch, "").is_err());
    }

    #[test]
    fn test_parse_progress_line() {
        let mut progress = Progress::default();
        assert!(parse_progress_line("out_time_us=5000000", &mut progress).is_none());
        assert_eq!(progress.out_time_ms, 5000);
        assert!(parse_progress_line("frame=42", &mut progress).is_none());

        let snapshot = parse_progress_line("progress=end", &mut progress).unwrap();
        assert!(snapshot.done);
        assert_eq!(snapshot.frame, 42);
    }

    #[tokio::test]
    async fn test_commands_before_load_are_rejected() {
        let (transport, mut events) = spawn_engine(EngineConfig::default()).unwrap();
        transport
            .send(Command {
                id: 1,
                kind: CommandKind::WriteFile {
                    path: "input.mp4".into(),
                    data: vec![0],
                },
            })
            .unwrap();

        match events.recv().await.unwrap() {
            EngineEvent::Reply { id, outcome } => {
                assert_eq!(id, 1);
                assert!(matches!(outcome, Err(EngineFault::NotLoaded)));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg in PATH"]
    async fn test_load_then_file_roundtrip() {
        let (transport, mut events) = spawn_engine(EngineConfig::default()).unwrap();
        transport
            .send(Command {
                id: 1,
                kind: CommandKind::Load,
            })
            .unwrap();
        transport
            .send(Command {
                id: 2,
                kind: CommandKind::WriteFile {
                    path: "a.bin".into(),
                    data: vec![1, 2, 3],
                },
            })
            .unwrap();
        transport
            .send(Command {
                id: 3,
                kind: CommandKind::ReadFile { path: "a.bin".into() },
            })
            .unwrap();

        let mut data = None;
        for _ in 0..3 {
            if let EngineEvent::Reply { id: 3, outcome } = events.recv().await.unwrap() {
                data = Some(outcome.unwrap());
            }
        }
        match data {
            Some(Reply::Data(bytes)) => assert_eq!(bytes, vec![1, 2, 3]),
            other => panic!("unexpected reply: {other:?}"),
        }
    }
}
