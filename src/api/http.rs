//! HTTP client wrapper for the photobooth backend.
//!
//! Every outbound call goes through [`ApiClient`], which injects the current
//! bearer token and a JSON content type, and normalizes every failure into
//! [`ApiError`].

use std::sync::{Arc, RwLock};

use reqwest::{header, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::Config;

/// Message used when no response was received at all
pub const UNREACHABLE_MESSAGE: &str = "Unable to reach server. Please check your connection.";

const JSON_CONTENT_TYPE: &str = "application/json";

/// The single error shape surfaced by every API call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    pub status_code: Option<u16>,
    /// Field-level messages when the server sent an array of messages
    pub details: Option<Vec<String>>,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
            details: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self {
            message: message.into(),
            status_code: Some(status_code),
            details: None,
        }
    }

    pub fn unreachable() -> Self {
        Self::new(UNREACHABLE_MESSAGE)
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code == Some(StatusCode::NOT_FOUND.as_u16())
    }

    /// Build the error for a non-2xx response from its status and raw body.
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let payload: ErrorPayload = serde_json::from_slice(body).unwrap_or_default();

        let (first, details) = match payload.message {
            Some(ErrorMessage::Many(messages)) => (messages.first().cloned(), Some(messages)),
            Some(ErrorMessage::One(message)) => (Some(message), None),
            None => (None, None),
        };

        let message = first
            .or(payload.error)
            .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()));

        Self {
            message,
            status_code: Some(payload.status_code.unwrap_or(status.as_u16())),
            details,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorPayload {
    #[serde(default)]
    status_code: Option<u16>,
    #[serde(default)]
    message: Option<ErrorMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorMessage {
    One(String),
    Many(Vec<String>),
}

/// Failure at the wrapper/facade boundary.
///
/// `Api` errors are already normalized; `Unexpected` ones are wrapped by the
/// facade with an operation-specific message.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl RequestError {
    pub fn or_fallback(self, fallback: &str) -> ApiError {
        match self {
            RequestError::Api(e) => e,
            RequestError::Unexpected(detail) => {
                log::warn!("{} ({})", fallback, detail);
                ApiError::new(fallback)
            }
        }
    }
}

/// Shared slot holding the bearer token injected into outbound requests
#[derive(Debug, Clone, Default)]
pub struct TokenSlot(Arc<RwLock<Option<String>>>);

impl TokenSlot {
    pub fn set(&self, token: Option<String>) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    pub fn get(&self) -> Option<String> {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_set(&self) -> bool {
        self.0.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

/// HTTP client for the photobooth API
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base: String,
    token: TokenSlot,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::new(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base: config.api_base.trim_end_matches('/').to_string(),
            token: TokenSlot::default(),
        })
    }

    /// Handle to the token slot, shared with the auth store
    pub fn token_slot(&self) -> TokenSlot {
        self.token.clone()
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, RequestError> {
        if path.split('/').any(is_dot_segment) {
            return Err(ApiError::new(format!("Invalid request path: {}", path)).into());
        }
        let mut url = Url::parse(&format!("{}{}", self.base, path))
            .map_err(|e| RequestError::Unexpected(format!("invalid URL for {}: {}", path, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// Request builder with auth and content-type headers applied
    fn request(&self, method: Method, url: Url, content_type: Option<&str>) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, url)
            .header(header::CONTENT_TYPE, content_type.unwrap_or(JSON_CONTENT_TYPE));

        if let Some(token) = self.token.get() {
            builder = builder.bearer_auth(token);
        }

        builder
    }

    /// Send one request and return the raw body of a 2xx response.
    pub(crate) async fn send<B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<Vec<u8>, RequestError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(path, query)?;
        log::debug!("{} {}", method, url);

        let mut builder = self.request(method.clone(), url, None);
        if let Some(body) = body {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| RequestError::Unexpected(format!("failed to encode body: {}", e)))?;
            builder = builder.body(bytes);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if e.is_builder() => return Err(RequestError::Unexpected(e.to_string())),
            Err(e) => {
                log::warn!("{} {} failed: {}", method, path, e);
                return Err(ApiError::unreachable().into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
            let error = ApiError::from_response(status, &body);
            log::warn!("{} {} rejected ({}): {}", method, path, status, error.message);
            return Err(error.into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RequestError::Unexpected(format!("failed to read body: {}", e)))?;
        Ok(bytes.to_vec())
    }

    pub(crate) async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, RequestError>
    where
        T: DeserializeOwned,
    {
        let body = self.send::<()>(Method::GET, path, query, None).await?;
        decode(&body)
    }

    pub(crate) async fn send_json<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, RequestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = self.send(method, path, &[], body).await?;
        decode(&body)
    }
}

/// Decode a JSON body; an empty body decodes as `null`.
/// URL parsing folds these into the parent path
fn is_dot_segment(segment: &str) -> bool {
    matches!(
        segment.to_ascii_lowercase().as_str(),
        "." | ".." | "%2e" | ".%2e" | "%2e." | "%2e%2e"
    )
}

pub(crate) fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, RequestError> {
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| RequestError::Unexpected(format!("invalid response body: {}", e)))
}
