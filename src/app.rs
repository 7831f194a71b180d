//! Application context - bridges the IO-free state machine with the backend.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::api::{Backend, CreateSessionRequest};
use crate::config;
use crate::dialog::{ConfirmDialog, ConfirmRequest};
use crate::navigation::{Navigator, Route};
use crate::poller::{self, LivePollers, PollHandle};
use crate::state::{CaptureCommand, CaptureEvent, CaptureStateMachine};
use crate::store::AuthStore;

/// Messages sent from async tasks to the event loop
#[derive(Debug, Clone)]
pub enum AppMessage {
    /// Process a capture event through the state machine
    Event(CaptureEvent),
}

/// Sender that can dispatch messages to the event loop from any task
#[derive(Clone)]
pub struct MessageSender {
    tx: mpsc::UnboundedSender<AppMessage>,
}

impl MessageSender {
    pub fn send(&self, msg: AppMessage) {
        let _ = self.tx.send(msg);
    }

    fn event(&self, event: CaptureEvent) {
        self.send(AppMessage::Event(event));
    }
}

// Fallback messages shown when the backend gives no usable error.
const CREATE_FAILED: &str = "Failed to create session. Please try again.";
const START_FAILED: &str = "Failed to start session. Please try again.";
const ADD_FILTER_FAILED: &str = "Failed to add filter. Please try again.";
const REMOVE_FILTER_FAILED: &str = "Failed to remove filter. Please try again.";
const CAPTURE_FAILED: &str = "Failed to start capture. Please try again.";
const CANCEL_FAILED: &str = "Failed to cancel session. Please try again.";

fn error_text(error: &crate::api::ApiError, fallback: &str) -> String {
    if error.message.trim().is_empty() {
        fallback.to_string()
    } else {
        error.message.clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Application context - holds state and provides methods to interact with it
pub struct AppContext {
    /// The IO-free capture state machine
    pub state_machine: Mutex<CaptureStateMachine>,
    pub navigator: Mutex<Navigator>,
    pub backend: Arc<dyn Backend>,
    pub auth: Arc<AuthStore>,
    pub dialog: Arc<ConfirmDialog>,
    /// Runtime handle for async operations
    pub runtime: Handle,
    /// Sender for dispatching messages to the event loop
    pub message_tx: MessageSender,
    poll_interval: Duration,
    poll_handle: Mutex<Option<PollHandle>>,
    live_pollers: LivePollers,
}

impl AppContext {
    pub fn new(
        backend: Arc<dyn Backend>,
        auth: Arc<AuthStore>,
        dialog: Arc<ConfirmDialog>,
        runtime: Handle,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<AppMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let points = auth.snapshot().points();

        let ctx = Arc::new(Self {
            state_machine: Mutex::new(CaptureStateMachine::new(points)),
            navigator: Mutex::new(Navigator::new(Route::Home)),
            backend,
            auth,
            dialog,
            runtime,
            message_tx: MessageSender { tx },
            poll_interval: config::status_poll_interval(),
            poll_handle: Mutex::new(None),
            live_pollers: LivePollers::default(),
        });

        (ctx, rx)
    }

    /// Send an event to the state machine (from any task)
    pub fn send_event(&self, event: CaptureEvent) {
        self.message_tx.event(event);
    }

    pub fn handle_message(self: &Arc<Self>, msg: AppMessage) -> Vec<CaptureCommand> {
        match msg {
            AppMessage::Event(event) => self.process_event(event),
        }
    }

    /// Process an event and execute resulting commands
    pub fn process_event(self: &Arc<Self>, event: CaptureEvent) -> Vec<CaptureCommand> {
        log::debug!("Event: {:?}", event);
        let commands = lock(&self.state_machine).process(event);

        for cmd in &commands {
            self.execute_command(cmd.clone());
        }

        commands
    }

    /// Copy of the current capture state
    pub fn machine(&self) -> CaptureStateMachine {
        lock(&self.state_machine).clone()
    }

    pub fn current_route(&self) -> Route {
        lock(&self.navigator).current().clone()
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.poll_handle).as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Poll tasks still alive, including ones being torn down
    pub fn live_pollers(&self) -> usize {
        self.live_pollers.count()
    }

    /// Execute a command from the state machine
    fn execute_command(self: &Arc<Self>, cmd: CaptureCommand) {
        match cmd {
            CaptureCommand::RefreshUser => {
                let tx = self.message_tx.clone();
                let auth = self.auth.clone();

                self.runtime.spawn(async move {
                    match auth.current_user().await {
                        Ok(user) => tx.event(CaptureEvent::PointsRefreshed { points: user.points }),
                        Err(e) => tx.event(CaptureEvent::PointsRefreshFailed { error: e.to_string() }),
                    }
                });
            }

            CaptureCommand::CreateSession { photobooth_id } => {
                let tx = self.message_tx.clone();
                let backend = self.backend.clone();

                self.runtime.spawn(async move {
                    match backend.create_session(CreateSessionRequest::new(photobooth_id)).await {
                        Ok(session) => {
                            log::info!("Created session {}", session.id);
                            tx.event(CaptureEvent::SessionCreated {
                                session_id: session.id,
                                photobooth_id: session.photobooth_id,
                            });
                        }
                        Err(e) => {
                            log::error!("Failed to create session: {}", e);
                            tx.event(CaptureEvent::SessionCreateFailed {
                                error: error_text(&e, CREATE_FAILED),
                            });
                        }
                    }
                });
            }

            CaptureCommand::StartSession { session_id } => {
                let tx = self.message_tx.clone();
                let backend = self.backend.clone();

                self.runtime.spawn(async move {
                    match backend.start_session(&session_id).await {
                        Ok(_) => tx.event(CaptureEvent::SessionStarted),
                        Err(e) => {
                            log::error!("Failed to start session {}: {}", session_id, e);
                            tx.event(CaptureEvent::SessionStartFailed {
                                error: error_text(&e, START_FAILED),
                            });
                        }
                    }
                });
            }

            CaptureCommand::AddFilter { session_id, filter_id } => {
                let tx = self.message_tx.clone();
                let backend = self.backend.clone();

                self.runtime.spawn(async move {
                    match backend.add_filter(&session_id, &filter_id).await {
                        Ok(_) => tx.event(CaptureEvent::FilterAdded { filter_id }),
                        Err(e) => tx.event(CaptureEvent::FilterChangeFailed {
                            error: error_text(&e, ADD_FILTER_FAILED),
                        }),
                    }
                });
            }

            CaptureCommand::RemoveFilter { session_id, filter_id } => {
                let tx = self.message_tx.clone();
                let backend = self.backend.clone();

                self.runtime.spawn(async move {
                    match backend.remove_filter(&session_id, &filter_id).await {
                        Ok(_) => tx.event(CaptureEvent::FilterRemoved { filter_id }),
                        Err(e) => tx.event(CaptureEvent::FilterChangeFailed {
                            error: error_text(&e, REMOVE_FILTER_FAILED),
                        }),
                    }
                });
            }

            CaptureCommand::RemoveAllFilters { session_id, filter_ids } => {
                let tx = self.message_tx.clone();
                let backend = self.backend.clone();

                self.runtime.spawn(async move {
                    let removals = filter_ids.iter().map(|filter_id| {
                        let backend = backend.clone();
                        let session_id = session_id.clone();
                        async move {
                            let result = backend.remove_filter(&session_id, filter_id).await;
                            (filter_id.clone(), result)
                        }
                    });

                    let mut removed = Vec::new();
                    let mut error = None;
                    for (filter_id, result) in join_all(removals).await {
                        match result {
                            Ok(_) => removed.push(filter_id),
                            Err(e) => {
                                log::warn!("Failed to remove filter {}: {}", filter_id, e);
                                error.get_or_insert_with(|| error_text(&e, REMOVE_FILTER_FAILED));
                            }
                        }
                    }
                    tx.event(CaptureEvent::FiltersCleared { removed, error });
                });
            }

            CaptureCommand::RefetchSession { session_id } => {
                let tx = self.message_tx.clone();
                let backend = self.backend.clone();

                self.runtime.spawn(async move {
                    match backend.session(&session_id).await {
                        Ok(session) => tx.event(CaptureEvent::SessionRefetched {
                            filter_ids: session.filter_ids,
                        }),
                        Err(e) => {
                            log::warn!("Could not reload session {}: {}", session_id, e);
                            tx.event(CaptureEvent::SessionRefetchFailed { error: e.to_string() });
                        }
                    }
                });
            }

            CaptureCommand::StartCapture { session_id } => {
                let tx = self.message_tx.clone();
                let backend = self.backend.clone();

                self.runtime.spawn(async move {
                    match backend.start_capture(&session_id).await {
                        Ok(response) => {
                            log::info!("{}", response.message);
                            tx.event(CaptureEvent::CaptureStarted);
                        }
                        Err(e) => {
                            log::error!("Failed to start capture: {}", e);
                            tx.event(CaptureEvent::CaptureFailed {
                                error: error_text(&e, CAPTURE_FAILED),
                            });
                        }
                    }
                });
            }

            CaptureCommand::StartPolling { session_id } => {
                let tx = self.message_tx.clone();
                let _enter = self.runtime.enter();
                let handle = poller::spawn(
                    self.backend.clone(),
                    session_id,
                    self.poll_interval,
                    &self.live_pollers,
                    move |event| tx.event(event),
                );

                // Replacing a handle drops, and so aborts, the old task.
                if let Some(previous) = lock(&self.poll_handle).replace(handle) {
                    log::warn!("Replacing poller for {}", previous.session_id());
                    previous.stop();
                }
            }

            CaptureCommand::StopPolling => {
                if let Some(handle) = lock(&self.poll_handle).take() {
                    handle.stop();
                }
            }

            CaptureCommand::ConfirmCancel => {
                let tx = self.message_tx.clone();
                let answer = self.dialog.confirm(
                    ConfirmRequest::new("Cancel session")
                        .message("Are you sure you want to cancel this session?")
                        .confirm_text("Cancel session")
                        .cancel_text("Keep session"),
                );

                self.runtime.spawn(async move {
                    if answer.await {
                        tx.event(CaptureEvent::CancelConfirmed);
                    } else {
                        tx.event(CaptureEvent::CancelDeclined);
                    }
                });
            }

            CaptureCommand::CancelSession { session_id } => {
                let tx = self.message_tx.clone();
                let backend = self.backend.clone();

                self.runtime.spawn(async move {
                    match backend.cancel_session(&session_id).await {
                        Ok(_) => {
                            log::info!("Cancelled session {}", session_id);
                            tx.event(CaptureEvent::SessionCancelled);
                        }
                        Err(e) => {
                            log::error!("Failed to cancel session {}: {}", session_id, e);
                            tx.event(CaptureEvent::CancelFailed {
                                error: error_text(&e, CANCEL_FAILED),
                            });
                        }
                    }
                });
            }

            CaptureCommand::Navigate(nav) => {
                lock(&self.navigator).apply(nav);
            }

            CaptureCommand::UpdateUI => {
                // Front ends re-read `machine()` after each processed message
            }
        }
    }
}
