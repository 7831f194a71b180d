//! Configuration constants for the photobooth client.

use std::path::PathBuf;
use std::time::Duration;

use once_cell::sync::Lazy;

/// Default base URL for HTTP API calls
pub const API_BASE: &str = "http://localhost:3000/api/v1";

/// Request timeout applied to every API call
pub const REQUEST_TIMEOUT_MS: u64 = 15_000;

/// Points deducted to start one capture session
pub const CAPTURE_COST: u64 = 10_000;

/// Photos per session requested on create
pub const DEFAULT_MAX_PHOTOS: u32 = 4;

/// Session status polling interval once capture has started
pub const STATUS_POLL_INTERVAL_MS: u64 = 3_000;

/// Page size for history and asset listings
pub const PAGE_LIMIT: u32 = 20;

/// Bank transfer QR image service
pub const BANK_QR_BASE: &str = "https://qr.sepay.vn/img";

/// Prefix of every transfer description, followed by the payment code
pub const TRANSFER_PREFIX: &str = "PTB";

/// Smallest accepted top-up (1 VND = 1 point)
pub const MIN_TOPUP_AMOUNT: u64 = 1_000;

/// Persisted storage keys
pub const AUTH_STORAGE_KEY: &str = "auth-storage";
pub const ONBOARDING_STORAGE_KEY: &str = "onboarding-storage";

const ENV_API_BASE: &str = "PHOTOBOOTH_API_BASE_URL";
const ENV_TIMEOUT: &str = "PHOTOBOOTH_REQUEST_TIMEOUT_MS";
const ENV_DATA_DIR: &str = "PHOTOBOOTH_DATA_DIR";

/// Runtime configuration, resolved from the environment with constant fallbacks.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub request_timeout: Duration,
    /// Directory holding persisted stores. `None` means the platform data dir.
    pub data_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        let api_base = std::env::var(ENV_API_BASE).unwrap_or_else(|_| API_BASE.to_string());

        let timeout_ms = match std::env::var(ENV_TIMEOUT) {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                log::warn!("Ignoring invalid {}={:?}", ENV_TIMEOUT, raw);
                REQUEST_TIMEOUT_MS
            }),
            Err(_) => REQUEST_TIMEOUT_MS,
        };

        Self {
            api_base,
            request_timeout: Duration::from_millis(timeout_ms),
            data_dir: std::env::var_os(ENV_DATA_DIR).map(PathBuf::from),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: API_BASE.to_string(),
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            data_dir: None,
        }
    }
}

/// Configuration read once from the process environment.
pub static ENV_CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

/// Status polling interval as a `Duration`
pub fn status_poll_interval() -> Duration {
    Duration::from_millis(STATUS_POLL_INTERVAL_MS)
}

// Endpoint paths, relative to the API base

pub fn login_path() -> &'static str {
    "/auth/login"
}

pub fn register_path() -> &'static str {
    "/auth/register"
}

pub fn current_user_path() -> &'static str {
    "/users/me"
}

pub fn bank_info_path() -> &'static str {
    "/bank-info"
}

pub fn filters_path() -> &'static str {
    "/assets/filters"
}

pub fn frames_path() -> &'static str {
    "/assets/frames"
}

pub fn sessions_path() -> &'static str {
    "/photobooth/sessions"
}

pub fn current_session_path() -> &'static str {
    "/photobooth/sessions/current"
}

pub fn user_sessions_path() -> &'static str {
    "/photobooth/sessions/user"
}

/// Percent-encode `raw` as one path segment; only RFC 3986 unreserved bytes
/// pass through. Dot segments survive and are refused by the HTTP client.
pub fn path_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

pub fn session_path(session_id: &str) -> String {
    format!("/photobooth/sessions/{}", path_segment(session_id))
}

pub fn session_start_path(session_id: &str) -> String {
    format!("{}/start", session_path(session_id))
}

pub fn start_capture_path(session_id: &str) -> String {
    format!("{}/start-capture", session_path(session_id))
}

pub fn change_filter_path(session_id: &str) -> String {
    format!("{}/change-filter", session_path(session_id))
}

pub fn remove_filter_path(session_id: &str, filter_id: &str) -> String {
    format!("{}/{}", change_filter_path(session_id), path_segment(filter_id))
}

pub fn cancel_session_path(session_id: &str) -> String {
    format!("{}/cancel", session_path(session_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_stay_inside_their_segment() {
        assert_eq!(
            remove_filter_path("s 1", "../x"),
            "/photobooth/sessions/s%201/change-filter/..%2Fx"
        );
        assert_eq!(cancel_session_path("a/b?c#d"), "/photobooth/sessions/a%2Fb%3Fc%23d/cancel");
        assert_eq!(session_path("caf\u{e9}"), "/photobooth/sessions/caf%C3%A9");
    }

    #[test]
    fn test_plain_ids_are_unchanged() {
        assert_eq!(
            session_start_path("3f2a-b9_c.d~e"),
            "/photobooth/sessions/3f2a-b9_c.d~e/start"
        );
        assert_eq!(change_filter_path("s-1"), "/photobooth/sessions/s-1/change-filter");
    }
}
