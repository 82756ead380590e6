//! Call correlator for the engine channel.
//!
//! Transmission and completion are decoupled: the channel delivers replies
//! asynchronously and possibly out of send order, so request/response
//! semantics are restored by matching correlation ids against a pending-call
//! table. The table is owned exclusively by the dispatcher; a pending call
//! exists from the moment its command is sent until a matching reply,
//! cancellation or teardown resolves it, exactly once (remove-on-resolve).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use metrics::counter;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::protocol::{Command, CommandId, CommandKind, EngineEvent, Progress, Reply};
use crate::transport::EngineTransport;

/// Counter incremented per dispatched command, labeled by kind.
pub const COMMANDS_TOTAL_METRIC: &str = "thumbd_engine_commands_total";

/// Handle identifying a registered log/progress listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type LogListener = Arc<dyn Fn(&str) + Send + Sync>;
type ProgressListener = Arc<dyn Fn(&Progress) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next: u64,
    log: HashMap<u64, LogListener>,
    progress: HashMap<u64, ProgressListener>,
}

struct Shared {
    next_id: AtomicU64,
    terminated: AtomicBool,
    pending: Mutex<HashMap<CommandId, oneshot::Sender<EngineResult<Reply>>>>,
    listeners: Mutex<Listeners>,
}

impl Shared {
    fn handle_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::Reply { id, outcome } => {
                let sender = self.pending.lock().expect("pending table poisoned").remove(&id);
                match sender {
                    Some(tx) => {
                        // Receiver may have been dropped by a cancelled caller.
                        let _ = tx.send(outcome.map_err(EngineError::from));
                    }
                    // Direct reply with no waiter is a protocol violation;
                    // broadcasts never go through this path.
                    None => warn!(id, "reply for unknown or already-resolved command"),
                }
            }
            EngineEvent::Log { message } => {
                // Fan out over a snapshot taken under the lock, invoked
                // outside it: a listener may re-enter the registry (for
                // example to unsubscribe itself) without deadlocking the
                // event pump.
                let snapshot: Vec<LogListener> = {
                    let listeners = self.listeners.lock().expect("listeners poisoned");
                    listeners.log.values().cloned().collect()
                };
                for listener in snapshot {
                    listener(&message);
                }
            }
            EngineEvent::Progress { progress } => {
                let snapshot: Vec<ProgressListener> = {
                    let listeners = self.listeners.lock().expect("listeners poisoned");
                    listeners.progress.values().cloned().collect()
                };
                for listener in snapshot {
                    listener(&progress);
                }
            }
        }
    }

    fn fail_all_pending(&self, err: &EngineError) {
        let drained: Vec<_> = {
            let mut pending = self.pending.lock().expect("pending table poisoned");
            pending.drain().collect()
        };
        for (id, tx) in drained {
            debug!(id, "resolving pending call on teardown");
            let _ = tx.send(Err(err.clone()));
        }
    }
}

/// Correlates outgoing commands with asynchronously delivered replies.
pub struct Dispatcher {
    transport: Box<dyn EngineTransport>,
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// Create a dispatcher over a transport and its event stream. A pump
    /// task resolves pending calls as events arrive; if the event stream
    /// ends (engine gone), every remaining call fails with `Terminated`.
    pub fn new(
        transport: Box<dyn EngineTransport>,
        mut events: mpsc::UnboundedReceiver<EngineEvent>,
    ) -> Self {
        let shared = Arc::new(Shared {
            next_id: AtomicU64::new(1),
            terminated: AtomicBool::new(false),
            pending: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Listeners::default()),
        });

        let pump = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                pump.handle_event(event);
            }
            pump.terminated.store(true, Ordering::SeqCst);
            pump.fail_all_pending(&EngineError::Terminated);
        });

        Self { transport, shared }
    }

    /// Send a command and await its reply.
    ///
    /// An optional cancel signal rejects only this call with `Cancelled`;
    /// other in-flight calls are unaffected. A dispatch racing `shutdown`
    /// may fail with `Terminated`.
    pub async fn dispatch(
        &self,
        kind: CommandKind,
        cancel: Option<watch::Receiver<bool>>,
    ) -> EngineResult<Reply> {
        if self.shared.terminated.load(Ordering::SeqCst) {
            return Err(EngineError::Terminated);
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        counter!(COMMANDS_TOTAL_METRIC, "kind" => kind.name()).increment(1);

        let (done_tx, done_rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().expect("pending table poisoned");
            let replaced = pending.insert(id, done_tx);
            debug_assert!(replaced.is_none(), "correlation id reused while pending");
        }

        if let Err(err) = self.transport.send(Command { id, kind }) {
            self.shared.pending.lock().expect("pending table poisoned").remove(&id);
            return Err(err);
        }

        match cancel {
            None => done_rx.await.unwrap_or(Err(EngineError::Terminated)),
            Some(mut cancel) => {
                tokio::select! {
                    // Prefer a reply that is already there over a racing cancel.
                    biased;
                    outcome = done_rx => outcome.unwrap_or(Err(EngineError::Terminated)),
                    _ = fired(&mut cancel) => {
                        self.shared.pending.lock().expect("pending table poisoned").remove(&id);
                        Err(EngineError::Cancelled)
                    }
                }
            }
        }
    }

    /// Register a listener for unsolicited log broadcasts.
    pub fn on_log(&self, listener: impl Fn(&str) + Send + Sync + 'static) -> ListenerId {
        let mut listeners = self.shared.listeners.lock().expect("listeners poisoned");
        let id = listeners.next;
        listeners.next += 1;
        listeners.log.insert(id, Arc::new(listener));
        ListenerId(id)
    }

    /// Remove a log listener by its handle.
    pub fn off_log(&self, id: ListenerId) {
        self.shared
            .listeners
            .lock()
            .expect("listeners poisoned")
            .log
            .remove(&id.0);
    }

    /// Register a listener for unsolicited progress broadcasts.
    pub fn on_progress(&self, listener: impl Fn(&Progress) + Send + Sync + 'static) -> ListenerId {
        let mut listeners = self.shared.listeners.lock().expect("listeners poisoned");
        let id = listeners.next;
        listeners.next += 1;
        listeners.progress.insert(id, Arc::new(listener));
        ListenerId(id)
    }

    /// Remove a progress listener by its handle.
    pub fn off_progress(&self, id: ListenerId) {
        self.shared
            .listeners
            .lock()
            .expect("listeners poisoned")
            .progress
            .remove(&id.0);
    }

    /// Tear down the session: every currently pending call resolves with
    /// `Terminated` and the table is cleared. Further dispatches fail until
    /// a fresh session is initialized.
    pub fn shutdown(&self) {
        self.shared.terminated.store(true, Ordering::SeqCst);
        self.shared.fail_all_pending(&EngineError::Terminated);
    }

    /// Number of unresolved calls (for readiness reporting).
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.lock().expect("pending table poisoned").len()
    }
}

/// Resolves once the cancel signal observes `true`. If the sender is
/// dropped without firing, the call simply can no longer be cancelled.
async fn fired(cancel: &mut watch::Receiver<bool>) {
    if *cancel.borrow() {
        return;
    }
    while cancel.changed().await.is_ok() {
        if *cancel.borrow() {
            return;
        }
    }
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EngineFault;
    use crate::transport::command_channel;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc::UnboundedSender;

    struct Loopback {
        dispatcher: Dispatcher,
        commands: mpsc::UnboundedReceiver<Command>,
        events: UnboundedSender<EngineEvent>,
    }

    fn loopback() -> Loopback {
        let (transport, commands) = command_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(Box::new(transport), events_rx);
        Loopback {
            dispatcher,
            commands,
            events,
        }
    }

    fn reply_data(id: CommandId) -> EngineEvent {
        EngineEvent::Reply {
            id,
            outcome: Ok(Reply::Data(id.to_be_bytes().to_vec())),
        }
    }

    #[tokio::test]
    async fn test_replies_match_requests_under_reordering() {
        let mut lb = loopback();
        let dispatcher = Arc::new(lb.dispatcher);

        let mut calls = Vec::new();
        for _ in 0..5 {
            let d = Arc::clone(&dispatcher);
            calls.push(tokio::spawn(async move {
                d.dispatch(CommandKind::ReadFile { path: "f".into() }, None).await
            }));
        }

        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(lb.commands.recv().await.unwrap().id);
        }

        // Deliver replies in reverse send order.
        for id in ids.iter().rev() {
            lb.events.send(reply_data(*id)).unwrap();
        }

        for (call, expected_id) in calls.into_iter().zip(ids) {
            match call.await.unwrap().unwrap() {
                Reply::Data(bytes) => {
                    assert_eq!(bytes, expected_id.to_be_bytes().to_vec());
                }
                other => panic!("unexpected reply: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_cancel_resolves_only_the_cancelled_call() {
        let mut lb = loopback();
        let dispatcher = Arc::new(lb.dispatcher);

        let (cancel_tx, cancel_rx) = watch::channel(false);

        let d = Arc::clone(&dispatcher);
        let call_a = tokio::spawn(async move {
            d.dispatch(CommandKind::ReadFile { path: "a".into() }, Some(cancel_rx)).await
        });
        let d = Arc::clone(&dispatcher);
        let call_b = tokio::spawn(async move {
            d.dispatch(CommandKind::ReadFile { path: "b".into() }, None).await
        });

        let id_a = lb.commands.recv().await.unwrap().id;
        let id_b = lb.commands.recv().await.unwrap().id;

        cancel_tx.send(true).unwrap();
        assert!(matches!(call_a.await.unwrap(), Err(EngineError::Cancelled)));

        // B is still pending and resolvable normally.
        assert_eq!(dispatcher.pending_calls(), 1);
        lb.events.send(reply_data(id_b)).unwrap();
        assert!(call_b.await.unwrap().is_ok());

        // A late reply for the cancelled id is dropped, not misdelivered.
        lb.events.send(reply_data(id_a)).unwrap();
        assert_eq!(dispatcher.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_fans_out_terminated() {
        let mut lb = loopback();
        let dispatcher = Arc::new(lb.dispatcher);

        let mut calls = Vec::new();
        for _ in 0..3 {
            let d = Arc::clone(&dispatcher);
            calls.push(tokio::spawn(async move {
                d.dispatch(CommandKind::Load, None).await
            }));
        }
        for _ in 0..3 {
            lb.commands.recv().await.unwrap();
        }

        dispatcher.shutdown();
        for call in calls {
            assert!(matches!(call.await.unwrap(), Err(EngineError::Terminated)));
        }
        assert_eq!(dispatcher.pending_calls(), 0);

        // New dispatches on a torn-down session fail fast.
        let err = dispatcher.dispatch(CommandKind::Load, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Terminated));
    }

    #[tokio::test]
    async fn test_engine_fault_reply_surfaces_as_error() {
        let mut lb = loopback();
        let dispatcher = lb.dispatcher;

        let call = tokio::spawn({
            let exec = CommandKind::Exec {
                args: vec!["-i".into(), "input.mp4".into()],
                timeout: None,
            };
            let d = dispatcher;
            async move { d.dispatch(exec, None).await }
        });

        let id = lb.commands.recv().await.unwrap().id;
        lb.events
            .send(EngineEvent::Reply {
                id,
                outcome: Err(EngineFault::ExecFailed {
                    exit_code: Some(1),
                    message: "conversion failed".into(),
                }),
            })
            .unwrap();

        assert!(matches!(
            call.await.unwrap(),
            Err(EngineError::ExecFailed { exit_code: Some(1), .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_reply_id_is_dropped() {
        let lb = loopback();
        lb.events
            .send(EngineEvent::Reply {
                id: 9999,
                outcome: Ok(Reply::Unit),
            })
            .unwrap();
        // Dispatcher keeps working afterwards.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(lb.dispatcher.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_broadcasts_fan_out_and_unsubscribe() {
        let lb = loopback();
        let seen = Arc::new(AtomicUsize::new(0));

        let s = Arc::clone(&seen);
        let first = lb.dispatcher.on_log(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        let s = Arc::clone(&seen);
        let _second = lb.dispatcher.on_log(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        lb.events
            .send(EngineEvent::Log { message: "frame=1".into() })
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        lb.dispatcher.off_log(first);
        lb.events
            .send(EngineEvent::Log { message: "frame=2".into() })
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_listener_may_mutate_registry_from_its_own_callback() {
        let mut lb = loopback();
        let dispatcher = Arc::new(lb.dispatcher);

        let seen = Arc::new(AtomicUsize::new(0));
        let own_id = Arc::new(Mutex::new(None::<ListenerId>));

        let d = Arc::clone(&dispatcher);
        let s = Arc::clone(&seen);
        let slot = Arc::clone(&own_id);
        let id = dispatcher.on_log(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
            // Subscribe and unsubscribe from inside the fan-out, including
            // removing this very listener.
            let extra = d.on_log(|_| {});
            d.off_log(extra);
            if let Some(own) = *slot.lock().unwrap() {
                d.off_log(own);
            }
        });
        *own_id.lock().unwrap() = Some(id);

        lb.events
            .send(EngineEvent::Log { message: "frame=1".into() })
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        // The pump survived the re-entrant callback: a normal dispatch
        // still resolves.
        let d = Arc::clone(&dispatcher);
        let call = tokio::spawn(async move {
            d.dispatch(CommandKind::ReadFile { path: "f".into() }, None).await
        });
        let id = lb.commands.recv().await.unwrap().id;
        lb.events.send(reply_data(id)).unwrap();
        assert!(call.await.unwrap().is_ok());

        // The listener removed itself during the first fan-out.
        lb.events
            .send(EngineEvent::Log { message: "frame=2".into() })
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_event_stream_end_terminates_pending() {
        let mut lb = loopback();
        let dispatcher = Arc::new(lb.dispatcher);

        let d = Arc::clone(&dispatcher);
        let call = tokio::spawn(async move { d.dispatch(CommandKind::Load, None).await });
        lb.commands.recv().await.unwrap();

        drop(lb.events);
        assert!(matches!(call.await.unwrap(), Err(EngineError::Terminated)));
    }
}
