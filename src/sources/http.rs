//! `reqwest` backed page fetcher

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, PRAGMA};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

use super::traits::PageFetcher;
use crate::errors::{AppError, AppResult, SourceError};
use crate::utils::url::UrlUtils;

/// HTTP client shared by article and thumbnail fetches
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    /// Create a fetcher with a connection timeout; request timeouts are per call
    pub fn new(user_agent: &str, connect_timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    fn map_send_error(url: &str, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            SourceError::timeout(UrlUtils::obfuscate_credentials(url)).into()
        } else {
            AppError::Http(e)
        }
    }

    fn check_status(response: Response, url: &str) -> AppResult<Response> {
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                url: UrlUtils::obfuscate_credentials(url),
            }
            .into());
        }
        Ok(response)
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_html(&self, url: &str, timeout: Duration) -> AppResult<String> {
        debug!("Fetching page: {}", UrlUtils::obfuscate_credentials(url));

        let response = self
            .client
            .get(url)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::map_send_error(url, e))?;
        let response = Self::check_status(response, url)?;

        let body = response
            .text()
            .await
            .map_err(|e| Self::map_send_error(url, e))?;
        debug!("Fetched {} bytes of HTML from {}", body.len(), url);
        Ok(body)
    }

    async fn fetch_bytes(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> AppResult<Vec<u8>> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| AppError::validation(format!("Invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| AppError::validation(format!("Invalid header value: {e}")))?;
            header_map.insert(name, value);
        }

        let response = self
            .client
            .get(url)
            .headers(header_map)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::map_send_error(url, e))?;
        let response = Self::check_status(response, url)?;

        let is_vector = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("image/svg"))
            .unwrap_or(false);
        if is_vector {
            return Err(SourceError::UnsupportedFormat {
                format: "image/svg+xml".to_string(),
                url: UrlUtils::obfuscate_credentials(url),
            }
            .into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::map_send_error(url, e))?;
        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}
