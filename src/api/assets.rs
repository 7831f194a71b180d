//! Filter and frame asset listings.

use async_trait::async_trait;

use super::http::{ApiClient, ApiError};
use super::types::{FilterAsset, FrameAsset, Page, PageQuery};
use crate::config;

#[async_trait]
pub trait AssetApi: Send + Sync {
    async fn filters(&self, query: PageQuery) -> Result<Page<FilterAsset>, ApiError>;

    async fn frames(&self, query: PageQuery) -> Result<Page<FrameAsset>, ApiError>;
}

#[async_trait]
impl AssetApi for ApiClient {
    async fn filters(&self, query: PageQuery) -> Result<Page<FilterAsset>, ApiError> {
        self.get_json(config::filters_path(), &query.pairs())
            .await
            .map_err(|e| e.or_fallback("Failed to get filters. Please try again."))
    }

    async fn frames(&self, query: PageQuery) -> Result<Page<FrameAsset>, ApiError> {
        self.get_json(config::frames_path(), &query.pairs())
            .await
            .map_err(|e| e.or_fallback("Failed to get frames. Please try again."))
    }
}
