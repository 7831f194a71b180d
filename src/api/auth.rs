//! Login and registration against the REST auth endpoint.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::http::{ApiClient, ApiError};
use super::types::{AuthResult, User};
use crate::config;

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResult, ApiError>;

    async fn register(&self, name: &str, email: &str, password: &str) -> Result<AuthResult, ApiError>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    message: String,
    access_token: String,
    user: LoginUser,
}

#[derive(Deserialize)]
struct LoginUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl From<LoginResponse> for AuthResult {
    fn from(response: LoginResponse) -> Self {
        AuthResult {
            message: response.message,
            token: response.access_token,
            user: User {
                id: response.user.id,
                email: response.user.email,
                name: response.user.name,
                phone: None,
                address: None,
                points: 0,
                payment_code: None,
                role: None,
            },
        }
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResult, ApiError> {
        log::info!("Logging in as {}", email);
        let response: LoginResponse = self
            .send_json(Method::POST, config::login_path(), Some(&LoginRequest { email, password }))
            .await
            .map_err(|e| e.or_fallback("Login failed. Please try again."))?;
        Ok(response.into())
    }

    async fn register(&self, name: &str, email: &str, password: &str) -> Result<AuthResult, ApiError> {
        log::info!("Registering {}", email);
        let body = RegisterRequest { name, email, password };
        let response: LoginResponse = self
            .send_json(Method::POST, config::register_path(), Some(&body))
            .await
            .map_err(|e| e.or_fallback("Registration failed. Please try again."))?;
        Ok(response.into())
    }
}
