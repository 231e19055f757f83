//! Fetching documentation pages.
//!
//! Fetch failures are logged and collapse to "no page": callers get an empty
//! link list or no document rather than an error.

mod html;

use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub use html::{collect_doc_links, extract_document, Document, DocumentMetadata};

use crate::config::ScraperConfig;
use crate::utils::HttpClient;

/// Errors that can occur while fetching a page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },
}

/// Documentation scraper over a shared HTTP client
#[derive(Debug, Clone)]
pub struct DocFetcher {
    client: HttpClient,
}

impl DocFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &ScraperConfig) -> Result<Self, FetchError> {
        let client = HttpClient::with_settings(
            &config.user_agent,
            Duration::from_secs(config.timeout_secs),
            Duration::from_secs(config.connect_timeout_secs),
        )?;
        Ok(Self::new(client))
    }

    async fn try_fetch(&self, url: &Url) -> Result<String, FetchError> {
        let response = self.client.client().get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    /// Body of `url`, or `None` on any failure
    pub async fn fetch_page(&self, url: &Url) -> Option<String> {
        match self.try_fetch(url).await {
            Ok(body) => {
                debug!("Fetched {} ({} bytes)", url, body.len());
                Some(body)
            }
            Err(e) => {
                warn!("Failed to fetch {}: {}", url, e);
                None
            }
        }
    }

    /// Same-site documentation links found on `base`
    pub async fn get_all_doc_urls(&self, base: &Url) -> Vec<String> {
        match self.fetch_page(base).await {
            Some(html) => collect_doc_links(&html, base),
            None => Vec::new(),
        }
    }

    /// Headers and body text of `url`
    pub async fn extract_content(&self, url: &Url) -> Option<Document> {
        let html = self.fetch_page(url).await?;
        Some(extract_document(&html, url.as_str()))
    }

    /// Extract several pages concurrently, preserving input order
    pub async fn extract_many(&self, urls: &[Url]) -> Vec<Option<Document>> {
        join_all(urls.iter().map(|url| self.extract_content(url))).await
    }
}
