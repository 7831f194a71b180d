//! Current user profile.

use async_trait::async_trait;

use super::http::{ApiClient, ApiError};
use super::types::User;
use crate::config;

#[async_trait]
pub trait UserApi: Send + Sync {
    /// Fetch the profile of the token's owner, including the points balance
    async fn current_user(&self) -> Result<User, ApiError>;
}

#[async_trait]
impl UserApi for ApiClient {
    async fn current_user(&self) -> Result<User, ApiError> {
        let user: User = self
            .get_json(config::current_user_path(), &[])
            .await
            .map_err(|e| e.or_fallback("Failed to get user information. Please try again."))?;
        log::debug!("Fetched user {} ({} points)", user.id, user.points);
        Ok(user)
    }
}
