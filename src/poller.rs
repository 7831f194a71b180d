//! Session status poller.
//!
//! Started once capture begins; re-reads the session on a fixed period and
//! reports each status through a callback. The task ends by itself after the
//! first terminal status or a failed check, and is aborted when its handle is
//! stopped or dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::api::{SessionApi, SessionStatus};
use crate::state::CaptureEvent;

/// Number of poll tasks currently alive
#[derive(Debug, Clone, Default)]
pub struct LivePollers(Arc<AtomicUsize>);

impl LivePollers {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn enter(&self) -> LiveGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        LiveGuard(self.0.clone())
    }
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Handle for controlling a running poller
pub struct PollHandle {
    session_id: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop polling; an in-flight check is abandoned
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.task.abort();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn a poller for `session_id`. The first check happens one `period`
/// after the call.
pub fn spawn<B, F>(
    backend: Arc<B>,
    session_id: String,
    period: Duration,
    live: &LivePollers,
    callback: F,
) -> PollHandle
where
    B: SessionApi + ?Sized + 'static,
    F: Fn(CaptureEvent) + Send + Sync + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let guard = live.enter();
    let id = session_id.clone();

    let task = tokio::spawn(async move {
        let _guard = guard;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!("Polling session {} every {:?}", id, period);

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    log::debug!("Poller for {} stopped", id);
                    return;
                }
                _ = ticker.tick() => {
                    match backend.session(&id).await {
                        Ok(session) => {
                            let status = session.status;
                            log::debug!("Session {} is {}", id, status);
                            callback(CaptureEvent::StatusReceived { status });
                            if status.is_terminal() {
                                return;
                            }
                        }
                        Err(e) => {
                            log::warn!("Status check for {} failed: {}", id, e);
                            callback(CaptureEvent::StatusCheckFailed { error: e.to_string() });
                            return;
                        }
                    }
                }
            }
        }
    });

    PollHandle {
        session_id,
        shutdown_tx: Some(shutdown_tx),
        task,
    }
}
