//! Article text prefetch: cache lookup, then fetch + extract + store

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cache::ArticleTextCache;
use crate::errors::AppResult;
use crate::extract::TextExtractor;
use crate::sources::PageFetcher;
use crate::utils::url::UrlUtils;

/// What a prefetch did for one article
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchOutcome {
    /// Text was already cached; nothing fetched
    AlreadyCached,
    /// Page fetched and non-empty text stored
    Stored,
    /// Page fetched but nothing readable was found
    Empty,
}

/// Fills the article text cache from the network
#[derive(Clone)]
pub struct TextPrefetcher {
    fetcher: Arc<dyn PageFetcher>,
    texts: Arc<ArticleTextCache>,
    html_timeout: Duration,
}

impl TextPrefetcher {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        texts: Arc<ArticleTextCache>,
        html_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            texts,
            html_timeout,
        }
    }

    /// Make sure `url` has cached text if the page yields any
    pub async fn prefetch(&self, url: &str) -> AppResult<PrefetchOutcome> {
        if self.texts.contains(url) {
            return Ok(PrefetchOutcome::AlreadyCached);
        }
        let text = self.fetch_and_extract(url).await?;
        if text.is_empty() {
            debug!(
                "No readable text in {}",
                UrlUtils::obfuscate_credentials(url)
            );
            return Ok(PrefetchOutcome::Empty);
        }
        self.texts.put(url, &text);
        Ok(PrefetchOutcome::Stored)
    }

    /// Cached text, or freshly extracted text (stored as a side effect)
    pub async fn text_for(&self, url: &str) -> AppResult<Option<String>> {
        if let Some(text) = self.texts.get(url) {
            return Ok(Some(text));
        }
        let text = self.fetch_and_extract(url).await?;
        if text.is_empty() {
            return Ok(None);
        }
        self.texts.put(url, &text);
        Ok(Some(text))
    }

    async fn fetch_and_extract(&self, url: &str) -> AppResult<String> {
        let html = self.fetcher.fetch_html(url, self.html_timeout).await?;
        Ok(TextExtractor::extract_readable_text(&html))
    }

    pub fn texts(&self) -> &Arc<ArticleTextCache> {
        &self.texts
    }
}
