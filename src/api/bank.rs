//! Bank account used for point top-ups.

use async_trait::async_trait;

use super::http::{ApiClient, ApiError};
use super::types::BankInfo;
use crate::config;

#[async_trait]
pub trait BankApi: Send + Sync {
    /// `None` when no bank account is configured (404 or empty body).
    async fn bank_info(&self) -> Result<Option<BankInfo>, ApiError>;
}

#[async_trait]
impl BankApi for ApiClient {
    async fn bank_info(&self) -> Result<Option<BankInfo>, ApiError> {
        match self.get_json::<Option<BankInfo>>(config::bank_info_path(), &[]).await {
            Ok(info) => Ok(info),
            Err(e) => {
                let error = e.or_fallback("Failed to get bank information. Please try again.");
                if error.is_not_found() {
                    log::info!("No bank info configured");
                    Ok(None)
                } else {
                    Err(error)
                }
            }
        }
    }
}
