//! Application facade
//!
//! [`FeedBrief`] wires the caches, the refresh orchestrator and the summary
//! pipeline together and is the only type callers need.

use futures::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::cache::{
    ArticleTextCache, FileStore, KeyValueStore, SummaryStore, ThumbnailCache,
};
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::llm::{LanguageModel, OpenAiCompatibleModel, UnavailableModel};
use crate::models::{
    ArticleRef, FeedRef, RefreshStats, Rgb, SummaryKey, SummaryLength, ThumbnailImage,
};
use crate::services::{RefreshOrchestrator, SummaryPipeline, TextPrefetcher};
use crate::sources::{FeedSource, HttpPageFetcher, PageFetcher};

/// Outbound dependencies of the facade
#[derive(Clone)]
pub struct Collaborators {
    pub feed_source: Arc<dyn FeedSource>,
    pub page_fetcher: Arc<dyn PageFetcher>,
    pub model: Arc<dyn LanguageModel>,
    pub store: Arc<dyn KeyValueStore>,
}

impl Collaborators {
    /// Production wiring: file-backed store, `reqwest` fetcher and the
    /// configured model endpoint (or none)
    pub async fn from_config(config: &Config, feed_source: Arc<dyn FeedSource>) -> AppResult<Self> {
        let store = FileStore::open(&config.storage.data_dir).await?;
        let page_fetcher = HttpPageFetcher::new(
            &config.thumbnails.user_agent,
            config.refresh.html_timeout,
        )?;
        let model: Arc<dyn LanguageModel> = match &config.model {
            Some(model) => Arc::new(OpenAiCompatibleModel::from_config(model)?),
            None => Arc::new(UnavailableModel),
        };
        Ok(Self {
            feed_source,
            page_fetcher: Arc::new(page_fetcher),
            model,
            store: Arc::new(store),
        })
    }
}

/// Refresh-and-cache pipeline entry point
pub struct FeedBrief {
    texts: Arc<ArticleTextCache>,
    summaries: Arc<SummaryStore>,
    thumbnails: Arc<ThumbnailCache>,
    prefetcher: TextPrefetcher,
    pipeline: SummaryPipeline,
    refresh: RefreshOrchestrator,
}

impl FeedBrief {
    /// Load persisted caches and assemble the services
    pub async fn open(config: &Config, collaborators: Collaborators) -> AppResult<Self> {
        config
            .validate()
            .map_err(|e| AppError::configuration(e.to_string()))?;
        let Collaborators {
            feed_source,
            page_fetcher,
            model,
            store,
        } = collaborators;

        let texts = Arc::new(
            ArticleTextCache::load(
                store.clone(),
                &config.storage.text_cache_key,
                config.cache.text_capacity,
                config.cache.flush_debounce,
            )
            .await,
        );
        let summaries = Arc::new(
            SummaryStore::load(
                store.clone(),
                &config.storage.summary_cache_key,
                config.cache.flush_debounce,
            )
            .await,
        );
        let thumbnails = Arc::new(
            ThumbnailCache::load(
                store,
                &config.storage.thumbnail_cache_key,
                &config.cache,
                config.thumbnails.clone(),
                page_fetcher.clone(),
            )
            .await,
        );

        let prefetcher =
            TextPrefetcher::new(page_fetcher, texts.clone(), config.refresh.html_timeout);
        let pipeline = SummaryPipeline::new(
            model,
            prefetcher.clone(),
            summaries.clone(),
            config.summary.clone(),
        );
        let refresh =
            RefreshOrchestrator::new(feed_source, prefetcher.clone(), config.refresh.clone());

        info!(
            "feedbrief ready: {} cached texts, {} summaries, {} thumbnails",
            texts.len(),
            summaries.len(),
            thumbnails.len()
        );

        Ok(Self {
            texts,
            summaries,
            thumbnails,
            prefetcher,
            pipeline,
            refresh,
        })
    }

    // Refresh

    pub async fn refresh_feeds(&self, feeds: &[FeedRef]) -> AppResult<RefreshStats> {
        self.refresh.refresh_feeds(feeds).await
    }

    pub fn refresh_progress(&self) -> watch::Receiver<RefreshStats> {
        self.refresh.progress()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_running()
    }

    // Article text

    pub fn get_cached_text(&self, url: &str) -> Option<String> {
        self.texts.get(url)
    }

    /// Cached text, or fetch and extract it now
    pub async fn fetch_text(&self, url: &str) -> AppResult<Option<String>> {
        self.prefetcher.text_for(url).await
    }

    pub fn clear_text_cache(&self) {
        self.texts.clear();
    }

    // Summaries

    pub fn summarize(
        &self,
        url: &str,
        length: SummaryLength,
        seed_text: Option<String>,
    ) -> BoxStream<'static, String> {
        self.pipeline.summarize(url, length, seed_text)
    }

    /// Summarize an article, seeding with its feed preview
    pub fn summarize_article(
        &self,
        article: &ArticleRef,
        length: SummaryLength,
    ) -> BoxStream<'static, String> {
        self.pipeline
            .summarize(&article.link, length, article.summary_preview.clone())
    }

    pub fn get_cached_summary(&self, url: &str, length: SummaryLength) -> Option<String> {
        self.summaries.get(&SummaryKey::new(url, length))
    }

    pub fn has_cached_summary(&self, url: &str, length: SummaryLength) -> bool {
        self.summaries.has_cached_summary(url, length)
    }

    pub fn is_expanded(&self, url: &str, length: SummaryLength) -> bool {
        self.summaries.is_expanded(&SummaryKey::new(url, length))
    }

    pub fn set_expanded(&self, url: &str, length: SummaryLength, expanded: bool) {
        self.summaries
            .set_expanded(&SummaryKey::new(url, length), expanded);
    }

    pub fn clear_summary(&self, url: &str, length: SummaryLength, clear_expansion: bool) {
        self.summaries
            .clear_summary(&SummaryKey::new(url, length), clear_expansion);
    }

    /// Drop every summary and expansion flag
    pub fn clear_summaries(&self) {
        self.summaries.clear_cache();
    }

    // Thumbnails

    pub fn get_thumbnail(&self, url: &str) -> Option<ThumbnailImage> {
        self.thumbnails.load_image(url)
    }

    pub fn get_thumbnail_with_color(&self, url: &str) -> Option<(ThumbnailImage, Rgb)> {
        self.thumbnails.load_with_color(url)
    }

    /// Download `url` into the thumbnail cache unless already present
    pub async fn cache_thumbnail(&self, url: &str) -> AppResult<bool> {
        self.thumbnails.download_and_cache(url).await
    }

    pub fn clear_thumbnails(&self) {
        self.thumbnails.clear();
    }

    /// Write every cache to the store now
    pub async fn flush(&self) {
        self.texts.flush().await;
        self.summaries.flush().await;
        self.thumbnails.flush().await;
    }
}
