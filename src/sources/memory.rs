//! In-memory feed source

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::traits::FeedSource;
use crate::errors::AppResult;
use crate::models::{ArticleRef, FeedRef};

/// Serves preloaded articles keyed by feed URL. Unknown feeds are empty.
#[derive(Debug, Default)]
pub struct StaticFeedSource {
    feeds: RwLock<HashMap<String, Vec<ArticleRef>>>,
}

impl StaticFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the articles served for `feed`
    pub fn set_items(&self, feed: &FeedRef, items: Vec<ArticleRef>) {
        self.feeds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(feed.url.clone(), items);
    }
}

#[async_trait]
impl FeedSource for StaticFeedSource {
    async fn fetch_feed_items(&self, feed: &FeedRef) -> AppResult<Vec<ArticleRef>> {
        Ok(self
            .feeds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&feed.url)
            .cloned()
            .unwrap_or_default())
    }
}
