//! Engine session lifecycle.
//!
//! Initialization is expensive and the engine is stateful, so it must run
//! exactly once per session even under concurrent first use: the first
//! caller installs a shared init future and every racing caller awaits that
//! same future. After a reset the slot is cleared and the next call performs
//! a fresh initialization. Transitions are monotonic: idle, starting, ready,
//! then back to idle only through `reset`.

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info};

use crate::dispatcher::Dispatcher;
use crate::error::EngineResult;

type InitFuture = Shared<BoxFuture<'static, EngineResult<Arc<Dispatcher>>>>;

enum SessionState {
    Idle,
    Starting(InitFuture),
    Ready(Arc<Dispatcher>),
}

/// Initialize-once, resettable holder of the live engine dispatcher.
///
/// Injectable rather than ambient: construct one per process (or per test).
pub struct EngineSession {
    state: Mutex<SessionState>,
}

impl Default for EngineSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineSession {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Idle),
        }
    }

    /// Return the ready dispatcher, initializing it with `init` if needed.
    ///
    /// Concurrent callers racing on an uninitialized session all await a
    /// single init future; `init` is invoked at most once per session. A
    /// failed initialization resets the slot so a later call retries.
    pub async fn ensure_ready<F, Fut>(&self, init: F) -> EngineResult<Arc<Dispatcher>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<Arc<Dispatcher>>> + Send + 'static,
    {
        let fut = {
            let mut state = self.state.lock().expect("session state poisoned");
            match &*state {
                SessionState::Ready(dispatcher) => return Ok(Arc::clone(dispatcher)),
                SessionState::Starting(fut) => fut.clone(),
                SessionState::Idle => {
                    debug!("starting engine initialization");
                    let fut = init().boxed().shared();
                    *state = SessionState::Starting(fut.clone());
                    fut
                }
            }
        };

        let outcome = fut.clone().await;

        let mut state = self.state.lock().expect("session state poisoned");
        if let SessionState::Starting(current) = &*state {
            // Only transition if nobody reset the session while we awaited.
            if current.ptr_eq(&fut) {
                match &outcome {
                    Ok(dispatcher) => {
                        info!("engine session ready");
                        *state = SessionState::Ready(Arc::clone(dispatcher));
                    }
                    Err(_) => {
                        *state = SessionState::Idle;
                    }
                }
            }
        }
        outcome
    }

    /// The live dispatcher, if the session is ready.
    pub fn dispatcher(&self) -> Option<Arc<Dispatcher>> {
        match &*self.state.lock().expect("session state poisoned") {
            SessionState::Ready(dispatcher) => Some(Arc::clone(dispatcher)),
            _ => None,
        }
    }

    /// Whether the session is currently ready.
    pub fn is_ready(&self) -> bool {
        matches!(
            &*self.state.lock().expect("session state poisoned"),
            SessionState::Ready(_)
        )
    }

    /// Clear the session back to uninitialized, returning the live
    /// dispatcher (if any) so the caller can tear it down. The next
    /// `ensure_ready` performs a fresh initialization.
    pub fn reset(&self) -> Option<Arc<Dispatcher>> {
        let mut state = self.state.lock().expect("session state poisoned");
        match std::mem::replace(&mut *state, SessionState::Idle) {
            SessionState::Ready(dispatcher) => Some(dispatcher),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::protocol::EngineEvent;
    use crate::transport::command_channel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn idle_dispatcher() -> (Arc<Dispatcher>, mpsc::UnboundedSender<EngineEvent>) {
        let (transport, _commands) = command_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Dispatcher::new(Box::new(transport), events_rx)),
            events_tx,
        )
    }

    #[tokio::test]
    async fn test_concurrent_first_use_initializes_once() {
        let session = Arc::new(EngineSession::new());
        let inits = Arc::new(AtomicUsize::new(0));

        let mut callers = Vec::new();
        for _ in 0..8 {
            let session = Arc::clone(&session);
            let inits = Arc::clone(&inits);
            callers.push(tokio::spawn(async move {
                session
                    .ensure_ready(move || async move {
                        inits.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(idle_dispatcher().0)
                    })
                    .await
            }));
        }

        for caller in callers {
            assert!(caller.await.unwrap().is_ok());
        }
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn test_reset_forces_fresh_initialization() {
        let session = EngineSession::new();
        let inits = Arc::new(AtomicUsize::new(0));

        let count = Arc::clone(&inits);
        session
            .ensure_ready(move || async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(idle_dispatcher().0)
            })
            .await
            .unwrap();

        assert!(session.reset().is_some());
        assert!(!session.is_ready());

        let count = Arc::clone(&inits);
        session
            .ensure_ready(move || async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(idle_dispatcher().0)
            })
            .await
            .unwrap();

        assert_eq!(inits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_initialization_is_shared_then_retryable() {
        let session = Arc::new(EngineSession::new());
        let inits = Arc::new(AtomicUsize::new(0));

        let mut callers = Vec::new();
        for _ in 0..4 {
            let session = Arc::clone(&session);
            let inits = Arc::clone(&inits);
            callers.push(tokio::spawn(async move {
                session
                    .ensure_ready(move || async move {
                        inits.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        Err(EngineError::spawn("ffmpeg missing"))
                    })
                    .await
            }));
        }

        // All racing callers observe the same failure.
        for caller in callers {
            assert!(matches!(caller.await.unwrap(), Err(EngineError::Spawn(_))));
        }
        assert_eq!(inits.load(Ordering::SeqCst), 1);

        // The slot was cleared, so a later call re-initializes.
        let inits2 = Arc::clone(&inits);
        let outcome = session
            .ensure_ready(move || async move {
                inits2.fetch_add(1, Ordering::SeqCst);
                Ok(idle_dispatcher().0)
            })
            .await;
        assert!(outcome.is_ok());
        assert_eq!(inits.load(Ordering::SeqCst), 2);
    }
}
