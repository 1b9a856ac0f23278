//! Source handler trait definitions

use async_trait::async_trait;
use std::time::Duration;

use crate::errors::AppResult;
use crate::models::{ArticleRef, FeedRef};

/// Produces the current articles of a feed
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_feed_items(&self, feed: &FeedRef) -> AppResult<Vec<ArticleRef>>;
}

/// Plain HTTP GET access for article pages and images
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a page as text, bypassing HTTP caches
    async fn fetch_html(&self, url: &str, timeout: Duration) -> AppResult<String>;

    /// Fetch raw bytes with extra request headers
    async fn fetch_bytes(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> AppResult<Vec<u8>>;
}
