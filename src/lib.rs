//! Photobooth client - points admission, remote capture and session history.
//!
//! Architecture:
//! - `state` module: IO-free session lifecycle state machine (testable)
//! - `app` module: Bridges the state machine to the backend and the poller
//! - `api` module: HTTP client and typed service facade
//! - `store` module: Auth and onboarding stores, persisted via `storage`
//! - `navigation` / `dialog`: route stack and the confirmation queue

pub mod api;
pub mod app;
pub mod config;
pub mod dialog;
pub mod history;
pub mod navigation;
pub mod poller;
pub mod state;
pub mod storage;
pub mod store;
pub mod topup;

#[cfg(test)]
mod testing;

pub use app::{AppContext, AppMessage};
pub use config::Config;
pub use state::{CaptureCommand, CaptureEvent, CaptureState, CaptureStateMachine};
