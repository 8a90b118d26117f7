//! Page loading
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests returning the page body
//! - Error classification for the retry controller
//!
//! The crawl machine depends only on the [`PageSource`] trait, so a browser
//! session or a test double can stand in for HTTP.

use crate::config::UserAgentConfig;
use crate::HarvestError;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;

/// A fetched page, ready for marker checks and extraction
#[derive(Debug, Clone)]
pub struct LoadedPage {
    /// Final URL after redirects
    pub url: String,

    /// Raw HTML body
    pub html: String,
}

impl LoadedPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }
}

/// Capability to load a page by URL
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Loads `url`; any error is treated as retryable by the caller
    async fn load(&self, url: &str) -> Result<LoadedPage, HarvestError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`PageSource`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a fetcher with the configured user agent
    pub fn from_config(config: &UserAgentConfig) -> Result<Self, HarvestError> {
        Ok(Self::new(build_http_client(config)?))
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn load(&self, url: &str) -> Result<LoadedPage, HarvestError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| HarvestError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let final_url = response.url().to_string();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(page_error(url, "rate limited (HTTP 429)"));
        }

        if !status.is_success() {
            return Err(page_error(url, format!("HTTP {}", status.as_u16())));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.is_empty() && !content_type.contains("html") {
            return Err(page_error(
                url,
                format!("unexpected content type '{}'", content_type),
            ));
        }

        let html = response.text().await.map_err(|source| HarvestError::Http {
            url: url.to_string(),
            source,
        })?;

        Ok(LoadedPage::new(final_url, html))
    }
}

fn page_error(url: &str, message: impl Into<String>) -> HarvestError {
    HarvestError::Page {
        url: url.to_string(),
        message: message.into(),
    }
}
