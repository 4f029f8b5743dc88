use crate::search::types::{SearchError, SearchRequest, SearchResponse};
use async_trait::async_trait;

/// Search capability consumed by the fetch coordinator.
/// Implementations answer exactly one page per call and never retry.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run one search request
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError>;

    /// Get the name of the backend, for logging
    fn backend_name(&self) -> &'static str;
}
