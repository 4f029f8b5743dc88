use crate::search::traits::SearchBackend;
use crate::search::types::{SearchError, SearchRequest, SearchResponse};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

const SEARCH_PATH: &str = "listings/search";

/// Search backend speaking JSON over HTTP
pub struct HttpSearchBackend {
    client: Client,
    endpoint: String,
}

impl HttpSearchBackend {
    /// Create a backend rooted at `base_url` (e.g. `https://api.example.com/v1`)
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("stay-scout/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        let endpoint = format!("{}/{}", base_url.trim_end_matches('/'), SEARCH_PATH);
        info!("Search endpoint: {}", endpoint);

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        debug!("Fetching {} page {}", self.endpoint, request.page);

        let response = self
            .client
            .get(&self.endpoint)
            .query(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Search backend returned status: {}", status);
            return Err(SearchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        debug!("Downloaded {} bytes of search results", body.len());

        let page: SearchResponse = serde_json::from_str(&body)?;
        Ok(page)
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let backend = HttpSearchBackend::new("https://api.example.com/v1/").unwrap();
        assert_eq!(backend.endpoint(), "https://api.example.com/v1/listings/search");
    }
}
