//! Photobooth session endpoints.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use super::http::{ApiClient, ApiError, RequestError};
use super::types::{CreateSessionRequest, Page, PageQuery, Session, StartCaptureResponse};
use crate::config;

#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn create_session(&self, request: CreateSessionRequest) -> Result<Session, ApiError>;

    async fn start_session(&self, session_id: &str) -> Result<Session, ApiError>;

    /// The caller's active session, or `None` when there is none
    async fn current_session(&self) -> Result<Option<Session>, ApiError>;

    async fn start_capture(&self, session_id: &str) -> Result<StartCaptureResponse, ApiError>;

    async fn add_filter(&self, session_id: &str, filter_id: &str) -> Result<Session, ApiError>;

    async fn remove_filter(&self, session_id: &str, filter_id: &str) -> Result<Session, ApiError>;

    async fn cancel_session(&self, session_id: &str) -> Result<Session, ApiError>;

    async fn session(&self, session_id: &str) -> Result<Session, ApiError>;

    async fn user_sessions(&self, query: PageQuery) -> Result<Page<Session>, ApiError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangeFilterRequest<'a> {
    filter_id: &'a str,
}

/// The current-session endpoint answers `null`, `{message, session: null}`
/// or a session object; all "no session" shapes collapse to `None`.
fn collapse_current_session(body: Value) -> Result<Option<Session>, RequestError> {
    let mut map = match body {
        Value::Object(map) => map,
        _ => return Ok(None),
    };

    if map.contains_key("id") {
        return serde_json::from_value(Value::Object(map))
            .map(Some)
            .map_err(|e| RequestError::Unexpected(format!("invalid session: {}", e)));
    }

    match map.remove("session") {
        Some(inner @ Value::Object(_)) => collapse_current_session(inner),
        _ => Ok(None),
    }
}

#[async_trait]
impl SessionApi for ApiClient {
    async fn create_session(&self, request: CreateSessionRequest) -> Result<Session, ApiError> {
        log::info!("Creating session for photobooth {}", request.photobooth_id);
        let session: Session = self
            .send_json(Method::POST, config::sessions_path(), Some(&request))
            .await
            .map_err(|e| e.or_fallback("Failed to create session. Please try again."))?;
        log::info!("Created session: {}", session.id);
        Ok(session)
    }

    async fn start_session(&self, session_id: &str) -> Result<Session, ApiError> {
        log::info!("Starting session {}", session_id);
        let body = StartSessionRequest { started_at: None };
        self.send_json(Method::PUT, &config::session_start_path(session_id), Some(&body))
            .await
            .map_err(|e| e.or_fallback("Failed to start session. Please try again."))
    }

    async fn current_session(&self) -> Result<Option<Session>, ApiError> {
        let result = match self.get_json::<Value>(config::current_session_path(), &[]).await {
            Ok(body) => collapse_current_session(body),
            Err(e) => Err(e),
        };

        match result {
            Ok(session) => Ok(session),
            Err(e) => {
                let error = e.or_fallback("Failed to get current session. Please try again.");
                if error.is_not_found() {
                    Ok(None)
                } else {
                    Err(error)
                }
            }
        }
    }

    async fn start_capture(&self, session_id: &str) -> Result<StartCaptureResponse, ApiError> {
        log::info!("Starting capture for session {}", session_id);
        self.send_json::<(), _>(Method::POST, &config::start_capture_path(session_id), None)
            .await
            .map_err(|e| e.or_fallback("Failed to start capture. Please try again."))
    }

    async fn add_filter(&self, session_id: &str, filter_id: &str) -> Result<Session, ApiError> {
        log::debug!("Adding filter {} to session {}", filter_id, session_id);
        let body = ChangeFilterRequest { filter_id };
        self.send_json(Method::POST, &config::change_filter_path(session_id), Some(&body))
            .await
            .map_err(|e| e.or_fallback("Failed to add filter. Please try again."))
    }

    async fn remove_filter(&self, session_id: &str, filter_id: &str) -> Result<Session, ApiError> {
        log::debug!("Removing filter {} from session {}", filter_id, session_id);
        self.send_json::<(), _>(Method::DELETE, &config::remove_filter_path(session_id, filter_id), None)
            .await
            .map_err(|e| e.or_fallback("Failed to remove filter. Please try again."))
    }

    async fn cancel_session(&self, session_id: &str) -> Result<Session, ApiError> {
        log::info!("Cancelling session {}", session_id);
        self.send_json::<(), _>(Method::PUT, &config::cancel_session_path(session_id), None)
            .await
            .map_err(|e| e.or_fallback("Failed to cancel session. Please try again."))
    }

    async fn session(&self, session_id: &str) -> Result<Session, ApiError> {
        self.get_json(&config::session_path(session_id), &[])
            .await
            .map_err(|e| e.or_fallback("Failed to get session. Please try again."))
    }

    async fn user_sessions(&self, query: PageQuery) -> Result<Page<Session>, ApiError> {
        self.get_json(config::user_sessions_path(), &query.pairs())
            .await
            .map_err(|e| e.or_fallback("Failed to get sessions. Please try again."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session_json() -> Value {
        json!({
            "id": "s-1",
            "status": "active",
            "photoboothId": "booth-42",
            "photoCount": 0,
            "maxPhotos": 4,
            "createdAt": "2025-01-02T03:04:05Z"
        })
    }

    #[test]
    fn test_null_means_no_session() {
        assert!(collapse_current_session(Value::Null).unwrap().is_none());
    }

    #[test]
    fn test_message_with_null_session_means_no_session() {
        let body = json!({"message": "No active session", "session": null});
        assert!(collapse_current_session(body).unwrap().is_none());
    }

    #[test]
    fn test_session_object_is_returned() {
        let session = collapse_current_session(session_json()).unwrap().unwrap();
        assert_eq!(session.id, "s-1");
        assert_eq!(session.photobooth_id, "booth-42");
    }

    #[test]
    fn test_wrapped_session_is_unwrapped() {
        let body = json!({"message": "ok", "session": session_json()});
        let session = collapse_current_session(body).unwrap().unwrap();
        assert_eq!(session.id, "s-1");
    }

    #[test]
    fn test_malformed_session_is_unexpected() {
        let body = json!({"id": "s-1", "status": "bogus"});
        assert!(matches!(
            collapse_current_session(body),
            Err(RequestError::Unexpected(_))
        ));
    }
}
