//! Feed refresh orchestration
//!
//! A run fans out over feeds, each feed holding a feed-gate permit for its
//! fetch and article prefetch. Within a feed, articles are prefetched in
//! batches: every article takes an article-gate permit and races its own
//! timeout, and the orchestrator pauses briefly between batches. Article
//! failures are logged and counted, never propagated. The whole run races a
//! global timeout, and a cooldown after each run rejects immediate
//! re-entry.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::concurrency_gate::ConcurrencyGate;
use super::prefetch::{PrefetchOutcome, TextPrefetcher};
use crate::config::RefreshConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{ArticleRef, FeedRef, RefreshStats};
use crate::sources::FeedSource;
use crate::utils::timeout::race_timeout;
use crate::utils::url::UrlUtils;

const OPERATION: &str = "feed_refresh";

#[derive(Debug, Default)]
struct RunState {
    running: bool,
    last_finished: Option<Instant>,
}

/// Clears the running flag and stamps the cooldown, however the run ends
struct RunGuard<'a> {
    state: &'a Mutex<RunState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.running = false;
        state.last_finished = Some(Instant::now());
    }
}

#[derive(Debug, Clone, Copy)]
enum ArticleResult {
    Cached,
    Skipped,
    Failed,
}

/// Everything a spawned feed task needs
#[derive(Clone)]
struct FeedWorker {
    source: Arc<dyn FeedSource>,
    prefetcher: TextPrefetcher,
    feed_gate: ConcurrencyGate,
    article_gate: ConcurrencyGate,
    config: RefreshConfig,
    progress: Arc<watch::Sender<RefreshStats>>,
}

impl FeedWorker {
    async fn run_feed(self, feed: FeedRef) {
        let _permit = self.feed_gate.acquire().await;

        match self.source.fetch_feed_items(&feed).await {
            Ok(items) => {
                debug!("Feed {} returned {} article(s)", feed.id, items.len());
                self.prefetch_articles(&feed, items).await;
            }
            Err(e) => warn!(
                "Failed to fetch feed {} ({}): {}",
                feed.id,
                UrlUtils::obfuscate_credentials(&feed.url),
                e
            ),
        }

        self.progress.send_modify(|stats| stats.completed += 1);
    }

    async fn prefetch_articles(&self, feed: &FeedRef, items: Vec<ArticleRef>) {
        let links: Vec<String> = items
            .into_iter()
            .map(|a| a.link)
            .filter(|link| !link.trim().is_empty())
            .collect();
        let batch_size = self.config.batch_size.max(1);
        let batches = links.len().div_ceil(batch_size);

        for (index, batch) in links.chunks(batch_size).enumerate() {
            let mut tasks = JoinSet::new();
            for link in batch {
                let worker = self.clone();
                let link = link.clone();
                tasks.spawn(async move { worker.prefetch_one(link).await });
            }

            while let Some(joined) = tasks.join_next().await {
                let result = joined.unwrap_or_else(|e| {
                    warn!("Article prefetch task for feed {} failed: {}", feed.id, e);
                    ArticleResult::Failed
                });
                self.progress.send_modify(|stats| match result {
                    ArticleResult::Cached => stats.articles_cached += 1,
                    ArticleResult::Skipped => stats.articles_skipped += 1,
                    ArticleResult::Failed => stats.articles_failed += 1,
                });
            }

            if index + 1 < batches {
                tokio::time::sleep(self.config.batch_pause).await;
            }
        }
    }

    async fn prefetch_one(self, link: String) -> ArticleResult {
        let _permit = self.article_gate.acquire().await;
        match race_timeout(self.config.item_timeout, self.prefetcher.prefetch(&link)).await {
            Ok(Ok(PrefetchOutcome::Stored)) => ArticleResult::Cached,
            Ok(Ok(PrefetchOutcome::AlreadyCached)) => ArticleResult::Skipped,
            Ok(Ok(PrefetchOutcome::Empty)) => ArticleResult::Failed,
            Ok(Err(e)) => {
                debug!(
                    "Prefetch of {} failed: {}",
                    UrlUtils::obfuscate_credentials(&link),
                    e
                );
                ArticleResult::Failed
            }
            Err(timed_out) => {
                debug!(
                    "Prefetch of {} abandoned: {}",
                    UrlUtils::obfuscate_credentials(&link),
                    timed_out
                );
                ArticleResult::Failed
            }
        }
    }
}

/// Refreshes feeds and warms the article text cache
pub struct RefreshOrchestrator {
    worker: FeedWorker,
    run_state: Mutex<RunState>,
}

impl RefreshOrchestrator {
    pub fn new(
        source: Arc<dyn FeedSource>,
        prefetcher: TextPrefetcher,
        config: RefreshConfig,
    ) -> Self {
        let (progress, _) = watch::channel(RefreshStats::default());
        let worker = FeedWorker {
            source,
            prefetcher,
            feed_gate: ConcurrencyGate::new("feeds", config.feed_concurrency),
            article_gate: ConcurrencyGate::new("articles", config.article_concurrency),
            config,
            progress: Arc::new(progress),
        };
        Self {
            worker,
            run_state: Mutex::new(RunState::default()),
        }
    }

    fn run_state(&self) -> MutexGuard<'_, RunState> {
        self.run_state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Observe the counters of the current or most recent run
    pub fn progress(&self) -> watch::Receiver<RefreshStats> {
        self.worker.progress.subscribe()
    }

    pub fn feed_gate(&self) -> &ConcurrencyGate {
        &self.worker.feed_gate
    }

    pub fn article_gate(&self) -> &ConcurrencyGate {
        &self.worker.article_gate
    }

    pub fn is_running(&self) -> bool {
        self.run_state().running
    }

    fn begin_run(&self) -> AppResult<RunGuard<'_>> {
        let mut state = self.run_state();
        if state.running {
            return Err(AppError::operation_in_progress(OPERATION, "already running"));
        }
        if let Some(finished) = state.last_finished
            && finished.elapsed() < self.worker.config.cooldown
        {
            return Err(AppError::operation_in_progress(OPERATION, "cooling down"));
        }
        state.running = true;
        Ok(RunGuard {
            state: &self.run_state,
        })
    }

    fn reset_gates(&self) {
        self.worker.feed_gate.reset();
        self.worker.article_gate.reset();
    }

    /// Refresh every feed and prefetch article text.
    ///
    /// Returns the run's counters. A run cut short by the global timeout
    /// still returns `Ok` with whatever was counted before it expired.
    /// Fails with [`AppError::OperationInProgress`] while another run is
    /// active or within the cooldown after the previous one.
    pub async fn refresh_feeds(&self, feeds: &[FeedRef]) -> AppResult<RefreshStats> {
        let _guard = self.begin_run()?;
        let started = Instant::now();

        self.reset_gates();
        self.worker.progress.send_replace(RefreshStats {
            total: feeds.len(),
            ..RefreshStats::default()
        });
        info!("Refreshing {} feed(s)", feeds.len());

        let mut tasks = JoinSet::new();
        for feed in feeds {
            let worker = self.worker.clone();
            let feed = feed.clone();
            tasks.spawn(worker.run_feed(feed));
        }

        let all_feeds = async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!("Feed refresh task failed: {}", e);
                    self.worker.progress.send_modify(|stats| stats.completed += 1);
                }
            }
        };

        if let Err(timed_out) = race_timeout(self.worker.config.global_timeout, all_feeds).await {
            warn!("Feed refresh {}; abandoning remaining work", timed_out);
            tasks.abort_all();
            self.reset_gates();
        }

        let stats = *self.worker.progress.borrow();
        info!(
            "Feed refresh finished in {:?}: {}/{} feeds, {} cached, {} skipped, {} failed",
            started.elapsed(),
            stats.completed,
            stats.total,
            stats.articles_cached,
            stats.articles_skipped,
            stats.articles_failed
        );
        Ok(stats)
    }
}
