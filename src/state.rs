//! IO-free session lifecycle state machine.
//!
//! This module holds the capture flow that spans the prepare, control and
//! detail screens: points admission, create + start, filter toggling, the
//! capture trigger, cancellation and status polling. It performs no IO; every
//! side effect is returned as a [`CaptureCommand`] for the app context to run,
//! and every result comes back as a [`CaptureEvent`].

use crate::api::SessionStatus;
use crate::config::CAPTURE_COST;
use crate::navigation::{NavCommand, Route};

/// Where the current visit is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No session yet - waiting for the user to start one
    NoSession,
    /// Create call in flight
    Creating,
    /// Session created, start call in flight
    Starting,
    /// Session running, filters can change, cancel is allowed
    Active,
    /// Capture command sent; filters and cancel are frozen
    CaptureStarted,
    /// Session left `active`; `None` when the status check itself failed
    Terminal(Option<SessionStatus>),
}

/// One entry of the filter picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChoice {
    /// The synthetic "no filter" entry: clears every applied filter
    None,
    Filter(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub id: String,
    pub photobooth_id: String,
    /// Applied filter ids in the order they were applied
    pub applied_filters: Vec<String>,
}

impl SessionData {
    pub fn has_filter(&self, filter_id: &str) -> bool {
        self.applied_filters.iter().any(|f| f == filter_id)
    }
}

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    // Screen lifecycle
    ScreenFocused,
    ControlMounted,
    ControlUnmounted,

    // User actions
    StartRequested { photobooth_id: String },
    ToggleFilter(FilterChoice),
    CaptureRequested,
    CancelRequested,
    CancelConfirmed,
    CancelDeclined,
    ErrorAcknowledged,

    // Backend responses
    PointsRefreshed { points: u64 },
    PointsRefreshFailed { error: String },
    SessionCreated { session_id: String, photobooth_id: String },
    SessionCreateFailed { error: String },
    SessionStarted,
    SessionStartFailed { error: String },
    FilterAdded { filter_id: String },
    FilterRemoved { filter_id: String },
    FilterChangeFailed { error: String },
    /// Result of removing every applied filter; `error` is set when at least
    /// one removal failed
    FiltersCleared { removed: Vec<String>, error: Option<String> },
    SessionRefetched { filter_ids: Vec<String> },
    SessionRefetchFailed { error: String },
    CaptureStarted,
    CaptureFailed { error: String },
    SessionCancelled,
    CancelFailed { error: String },

    // Poller
    StatusReceived { status: SessionStatus },
    StatusCheckFailed { error: String },
}

/// Commands emitted by the state machine for the app context to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureCommand {
    /// Re-fetch the user profile for a fresh points balance
    RefreshUser,
    CreateSession { photobooth_id: String },
    StartSession { session_id: String },
    AddFilter { session_id: String, filter_id: String },
    RemoveFilter { session_id: String, filter_id: String },
    /// Remove all of `filter_ids` in parallel
    RemoveAllFilters { session_id: String, filter_ids: Vec<String> },
    /// Reload the session to reconcile applied filters with the server
    RefetchSession { session_id: String },
    StartCapture { session_id: String },
    StartPolling { session_id: String },
    StopPolling,
    /// Ask the user to confirm cancellation
    ConfirmCancel,
    CancelSession { session_id: String },
    Navigate(NavCommand),
    /// Update UI to reflect new state
    UpdateUI,
}

pub const MISSING_PHOTOBOOTH: &str = "Photobooth not found. Please scan the QR code again.";

/// The session lifecycle state machine
#[derive(Debug, Clone)]
pub struct CaptureStateMachine {
    pub state: CaptureState,
    pub session: Option<SessionData>,
    /// Freshest known points balance
    pub points: Option<u64>,
    /// A filter add/remove is in flight
    pub filter_busy: bool,
    /// A capture or cancel call is in flight
    pub action_busy: bool,
    pub awaiting_cancel_confirmation: bool,
    pub control_mounted: bool,
    pub polling: bool,
    /// Error that must be acknowledged before it disappears
    pub error: Option<String>,
    /// Form-style message, cleared by the next action
    pub inline_error: Option<String>,
}

impl Default for CaptureStateMachine {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CaptureStateMachine {
    pub fn new(points: Option<u64>) -> Self {
        Self {
            state: CaptureState::NoSession,
            session: None,
            points,
            filter_busy: false,
            action_busy: false,
            awaiting_cancel_confirmation: false,
            control_mounted: false,
            polling: false,
            error: None,
            inline_error: None,
        }
    }

    pub fn has_enough_points(&self) -> bool {
        self.points.is_some_and(|p| p >= CAPTURE_COST)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, CaptureState::Creating | CaptureState::Starting)
    }

    pub fn applied_filters(&self) -> &[String] {
        self.session
            .as_ref()
            .map(|s| s.applied_filters.as_slice())
            .unwrap_or(&[])
    }

    /// Filters can be toggled right now
    pub fn can_change_filters(&self) -> bool {
        self.state == CaptureState::Active && !self.filter_busy && !self.action_busy
    }

    pub fn can_capture(&self) -> bool {
        self.can_change_filters()
    }

    pub fn can_cancel(&self) -> bool {
        self.can_change_filters() && !self.awaiting_cancel_confirmation
    }

    fn session_id(&self) -> Option<String> {
        self.session.as_ref().map(|s| s.id.clone())
    }

    fn enter_terminal(&mut self, status: Option<SessionStatus>, commands: &mut Vec<CaptureCommand>, root: Route) {
        self.state = CaptureState::Terminal(status);
        self.filter_busy = false;
        self.action_busy = false;
        self.awaiting_cancel_confirmation = false;
        if self.polling {
            self.polling = false;
            commands.push(CaptureCommand::StopPolling);
        }
        commands.push(CaptureCommand::Navigate(NavCommand::Reset(root)));
    }

    /// Process an event and return commands to execute
    pub fn process(&mut self, event: CaptureEvent) -> Vec<CaptureCommand> {
        let mut commands = Vec::new();

        match event {
            CaptureEvent::ScreenFocused => {
                // The balance can change out-of-band while the screen stays mounted.
                commands.push(CaptureCommand::RefreshUser);
            }

            CaptureEvent::PointsRefreshed { points } => {
                self.points = Some(points);
                commands.push(CaptureCommand::UpdateUI);
            }

            CaptureEvent::PointsRefreshFailed { error } => {
                log::warn!("Keeping last known balance: {}", error);
            }

            CaptureEvent::StartRequested { photobooth_id } => {
                let startable = matches!(self.state, CaptureState::NoSession | CaptureState::Terminal(_));
                let photobooth_id = photobooth_id.trim().to_string();

                if !startable {
                    log::debug!("Ignoring start request in {:?}", self.state);
                } else if photobooth_id.is_empty() {
                    self.inline_error = Some(MISSING_PHOTOBOOTH.to_string());
                    commands.push(CaptureCommand::UpdateUI);
                } else if !self.has_enough_points() {
                    log::info!(
                        "Balance {:?} below capture cost {}, redirecting to top-up",
                        self.points,
                        CAPTURE_COST
                    );
                    self.inline_error = None;
                    commands.push(CaptureCommand::Navigate(NavCommand::Navigate(Route::TopUpPoints)));
                    commands.push(CaptureCommand::UpdateUI);
                } else {
                    self.state = CaptureState::Creating;
                    self.session = None;
                    self.error = None;
                    self.inline_error = None;
                    commands.push(CaptureCommand::CreateSession { photobooth_id });
                    commands.push(CaptureCommand::UpdateUI);
                }
            }

            CaptureEvent::SessionCreated {
                session_id,
                photobooth_id,
            } => {
                if self.state == CaptureState::Creating {
                    self.state = CaptureState::Starting;
                    self.session = Some(SessionData {
                        id: session_id.clone(),
                        photobooth_id,
                        applied_filters: Vec::new(),
                    });
                    commands.push(CaptureCommand::StartSession { session_id });
                }
            }

            CaptureEvent::SessionCreateFailed { error } | CaptureEvent::SessionStartFailed { error } => {
                if matches!(self.state, CaptureState::Creating | CaptureState::Starting) {
                    self.state = CaptureState::NoSession;
                    self.session = None;
                    self.error = Some(error);
                    commands.push(CaptureCommand::UpdateUI);
                }
            }

            CaptureEvent::SessionStarted => {
                if self.state == CaptureState::Starting {
                    if let Some(ref session) = self.session {
                        self.state = CaptureState::Active;
                        commands.push(CaptureCommand::Navigate(NavCommand::Navigate(
                            Route::PhotoboothControl {
                                session_id: session.id.clone(),
                                photobooth_id: session.photobooth_id.clone(),
                            },
                        )));
                        // Starting a session spends points.
                        commands.push(CaptureCommand::RefreshUser);
                        commands.push(CaptureCommand::UpdateUI);
                    }
                }
            }

            CaptureEvent::ToggleFilter(choice) => {
                if !self.can_change_filters() {
                    log::debug!("Ignoring filter toggle");
                } else if let Some(ref session) = self.session {
                    let session_id = session.id.clone();
                    match choice {
                        FilterChoice::None => {
                            if !session.applied_filters.is_empty() {
                                self.filter_busy = true;
                                commands.push(CaptureCommand::RemoveAllFilters {
                                    session_id,
                                    filter_ids: session.applied_filters.clone(),
                                });
                            }
                        }
                        FilterChoice::Filter(filter_id) if filter_id.is_empty() => {}
                        FilterChoice::Filter(filter_id) => {
                            self.filter_busy = true;
                            if session.has_filter(&filter_id) {
                                commands.push(CaptureCommand::RemoveFilter { session_id, filter_id });
                            } else {
                                commands.push(CaptureCommand::AddFilter { session_id, filter_id });
                            }
                        }
                    }
                    commands.push(CaptureCommand::UpdateUI);
                }
            }

            CaptureEvent::FilterAdded { filter_id } => {
                self.filter_busy = false;
                if let Some(ref mut session) = self.session {
                    if !session.has_filter(&filter_id) {
                        session.applied_filters.push(filter_id);
                    }
                }
                commands.push(CaptureCommand::UpdateUI);
            }

            CaptureEvent::FilterRemoved { filter_id } => {
                self.filter_busy = false;
                if let Some(ref mut session) = self.session {
                    session.applied_filters.retain(|f| *f != filter_id);
                }
                commands.push(CaptureCommand::UpdateUI);
            }

            CaptureEvent::FilterChangeFailed { error } => {
                self.filter_busy = false;
                self.error = Some(error);
                commands.push(CaptureCommand::UpdateUI);
            }

            CaptureEvent::FiltersCleared { removed, error } => {
                self.filter_busy = false;
                if let Some(ref mut session) = self.session {
                    match error {
                        None => session.applied_filters.clear(),
                        Some(error) => {
                            session.applied_filters.retain(|f| !removed.contains(f));
                            self.error = Some(error);
                            // Filters stay locked until the server copy arrives
                            self.filter_busy = true;
                            commands.push(CaptureCommand::RefetchSession {
                                session_id: session.id.clone(),
                            });
                        }
                    }
                }
                commands.push(CaptureCommand::UpdateUI);
            }

            CaptureEvent::SessionRefetched { filter_ids } => {
                self.filter_busy = false;
                if matches!(self.state, CaptureState::Active | CaptureState::CaptureStarted) {
                    if let Some(ref mut session) = self.session {
                        session.applied_filters = filter_ids;
                    }
                }
                commands.push(CaptureCommand::UpdateUI);
            }

            CaptureEvent::SessionRefetchFailed { error } => {
                log::warn!("Could not reload session filters: {}", error);
                self.filter_busy = false;
                commands.push(CaptureCommand::UpdateUI);
            }

            CaptureEvent::CaptureRequested => {
                if self.can_capture() {
                    if let Some(session_id) = self.session_id() {
                        self.action_busy = true;
                        commands.push(CaptureCommand::StartCapture { session_id });
                        commands.push(CaptureCommand::UpdateUI);
                    }
                }
            }

            CaptureEvent::CaptureStarted => {
                if self.state == CaptureState::Active {
                    self.action_busy = false;
                    self.state = CaptureState::CaptureStarted;
                    if self.control_mounted && !self.polling {
                        if let Some(session_id) = self.session_id() {
                            self.polling = true;
                            commands.push(CaptureCommand::StartPolling { session_id });
                        }
                    }
                    commands.push(CaptureCommand::UpdateUI);
                }
            }

            CaptureEvent::CaptureFailed { error } => {
                self.action_busy = false;
                self.error = Some(error);
                commands.push(CaptureCommand::UpdateUI);
            }

            CaptureEvent::ControlMounted => {
                self.control_mounted = true;
                if self.state == CaptureState::CaptureStarted && !self.polling {
                    if let Some(session_id) = self.session_id() {
                        self.polling = true;
                        commands.push(CaptureCommand::StartPolling { session_id });
                    }
                }
            }

            CaptureEvent::ControlUnmounted => {
                self.control_mounted = false;
                if self.polling {
                    self.polling = false;
                    commands.push(CaptureCommand::StopPolling);
                }
            }

            CaptureEvent::StatusReceived { status } => {
                if self.state == CaptureState::CaptureStarted && self.polling {
                    if !SessionStatus::Active.can_transition_to(status) {
                        log::debug!("Ignoring out-of-order status {}", status);
                    } else if status != SessionStatus::Active {
                        log::info!("Session finished with status {}", status);
                        self.enter_terminal(Some(status), &mut commands, Route::History);
                        commands.push(CaptureCommand::UpdateUI);
                    }
                }
            }

            CaptureEvent::StatusCheckFailed { error } => {
                if self.state == CaptureState::CaptureStarted && self.polling {
                    log::warn!("Status check failed, treating session as finished: {}", error);
                    self.enter_terminal(None, &mut commands, Route::History);
                    commands.push(CaptureCommand::UpdateUI);
                }
            }

            CaptureEvent::CancelRequested => {
                if self.can_cancel() {
                    self.awaiting_cancel_confirmation = true;
                    commands.push(CaptureCommand::ConfirmCancel);
                }
            }

            CaptureEvent::CancelConfirmed => {
                if self.awaiting_cancel_confirmation {
                    self.awaiting_cancel_confirmation = false;
                    if self.can_cancel() {
                        if let Some(session_id) = self.session_id() {
                            self.action_busy = true;
                            commands.push(CaptureCommand::CancelSession { session_id });
                            commands.push(CaptureCommand::UpdateUI);
                        }
                    }
                }
            }

            CaptureEvent::CancelDeclined => {
                self.awaiting_cancel_confirmation = false;
            }

            CaptureEvent::SessionCancelled => {
                if self.state == CaptureState::Active {
                    self.enter_terminal(Some(SessionStatus::Cancelled), &mut commands, Route::Home);
                    commands.push(CaptureCommand::UpdateUI);
                }
            }

            CaptureEvent::CancelFailed { error } => {
                self.action_busy = false;
                self.error = Some(error);
                commands.push(CaptureCommand::UpdateUI);
            }

            CaptureEvent::ErrorAcknowledged => {
                self.error = None;
                commands.push(CaptureCommand::UpdateUI);
            }
        }

        commands
    }
}
