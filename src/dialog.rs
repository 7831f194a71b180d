//! Confirmation dialog with at most one pending request.
//!
//! Screens await [`ConfirmDialog::confirm`]; whichever front end is presenting
//! dialogs watches [`ConfirmDialog::subscribe`] and answers with
//! [`ConfirmDialog::resolve`]. A new request resolves the one it supersedes
//! with `false` before taking its place.

use std::future::Future;
use std::sync::Mutex;

use tokio::sync::{oneshot, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonVariant {
    Primary,
    Secondary,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogButton {
    pub text: String,
    pub variant: ButtonVariant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmRequest {
    pub title: String,
    pub message: Option<String>,
    /// Acknowledge-only dialog without a cancel button
    pub only_confirm: bool,
    pub confirm_button: DialogButton,
    pub cancel_button: DialogButton,
}

impl ConfirmRequest {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: None,
            only_confirm: false,
            confirm_button: DialogButton {
                text: "Confirm".into(),
                variant: ButtonVariant::Destructive,
            },
            cancel_button: DialogButton {
                text: "Cancel".into(),
                variant: ButtonVariant::Secondary,
            },
        }
    }

    /// Acknowledge-only notice
    pub fn alert(title: impl Into<String>, message: impl Into<String>) -> Self {
        let mut request = Self::new(title).message(message).confirm_text("OK");
        request.only_confirm = true;
        request.confirm_button.variant = ButtonVariant::Primary;
        request
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn confirm_text(mut self, text: impl Into<String>) -> Self {
        self.confirm_button.text = text.into();
        self
    }

    pub fn cancel_text(mut self, text: impl Into<String>) -> Self {
        self.cancel_button.text = text.into();
        self
    }
}

struct Pending {
    request: ConfirmRequest,
    responder: oneshot::Sender<bool>,
}

pub struct ConfirmDialog {
    pending: Mutex<Option<Pending>>,
    shown: watch::Sender<Option<ConfirmRequest>>,
}

impl Default for ConfirmDialog {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmDialog {
    pub fn new() -> Self {
        let (shown, _) = watch::channel(None);
        Self {
            pending: Mutex::new(None),
            shown,
        }
    }

    /// Queue `request` and wait for the answer. The request is registered
    /// immediately, before the returned future is first polled. A superseded
    /// or dropped request answers `false`.
    pub fn confirm(&self, request: ConfirmRequest) -> impl Future<Output = bool> + Send + 'static {
        let (responder, answer) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(previous) = pending.take() {
                log::debug!("Superseding dialog {:?}", previous.request.title);
                let _ = previous.responder.send(false);
            }
            *pending = Some(Pending {
                request: request.clone(),
                responder,
            });
            self.shown.send_replace(Some(request));
        }

        async move { answer.await.unwrap_or(false) }
    }

    /// Answer the pending request. Returns `false` when nothing was pending.
    pub fn resolve(&self, confirmed: bool) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        match pending.take() {
            Some(p) => {
                let _ = p.responder.send(confirmed);
                self.shown.send_replace(None);
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> Option<ConfirmRequest> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|p| p.request.clone())
    }

    pub fn is_open(&self) -> bool {
        self.pending().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ConfirmRequest>> {
        self.shown.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_answers_pending_request() {
        let dialog = ConfirmDialog::new();
        let answer = dialog.confirm(ConfirmRequest::new("Cancel session?"));

        assert_eq!(dialog.pending().map(|r| r.title), Some("Cancel session?".to_string()));
        assert!(dialog.resolve(true));
        assert!(answer.await);
        assert!(!dialog.is_open());
    }

    #[tokio::test]
    async fn test_new_request_supersedes_previous() {
        let dialog = ConfirmDialog::new();
        let first = dialog.confirm(ConfirmRequest::new("first"));
        let second = dialog.confirm(ConfirmRequest::new("second"));

        assert!(!first.await);
        assert_eq!(dialog.pending().map(|r| r.title), Some("second".to_string()));
        dialog.resolve(true);
        assert!(second.await);
    }

    #[test]
    fn test_resolve_without_pending_is_noop() {
        let dialog = ConfirmDialog::new();
        assert!(!dialog.resolve(true));
    }

    #[tokio::test]
    async fn test_subscribers_see_open_and_close() {
        let dialog = ConfirmDialog::new();
        let mut rx = dialog.subscribe();

        let answer = dialog.confirm(ConfirmRequest::alert("Error", "Failed"));
        rx.changed().await.unwrap();
        let shown = rx.borrow_and_update().clone().unwrap();
        assert!(shown.only_confirm);
        assert_eq!(shown.confirm_button.text, "OK");

        dialog.resolve(false);
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
        assert!(!answer.await);
    }

    #[test]
    fn test_defaults() {
        let request = ConfirmRequest::new("t");
        assert_eq!(request.confirm_button.text, "Confirm");
        assert_eq!(request.confirm_button.variant, ButtonVariant::Destructive);
        assert_eq!(request.cancel_button.text, "Cancel");
        assert_eq!(request.cancel_button.variant, ButtonVariant::Secondary);
        assert!(!request.only_confirm);
    }
}
