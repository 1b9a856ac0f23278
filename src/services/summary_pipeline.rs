//! Two-stage streaming summarization
//!
//! A request for `(link, length)` moves through these states:
//!
//! ```text
//! absent -> primer-streaming -> primer-sufficient            (cached, done)
//!                            -> full-streaming -> full-sufficient (cached, done)
//! ```
//!
//! A cached summary short-circuits everything. The primer stage prompts the
//! model with a few leading paragraphs and is accepted when its output
//! reaches the length threshold for the requested length. Otherwise the
//! full stage prompts with a structure-preserving excerpt and overwrites
//! the primer in the cache.
//!
//! Output is re-revealed a few characters per tick regardless of how the
//! model chunks its output. Dropping the stream cancels the request; only
//! stage results that finished streaming are ever cached.

use futures::stream::{BoxStream, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::prefetch::TextPrefetcher;
use crate::cache::SummaryStore;
use crate::config::SummaryConfig;
use crate::errors::{AppError, AppResult};
use crate::extract::{primer_slice, structure_slice};
use crate::llm::{LanguageModel, TextStream};
use crate::models::{SummaryKey, SummaryLength};
use crate::utils::url::UrlUtils;

const SHORT_INSTRUCTIONS: &str = "Summarize the article in exactly one sentence of at most 60 words. \
Use only information stated in the text.";

const LONG_INSTRUCTIONS: &str = "Summarize the article in 3 to 6 sentences and fewer than 200 words. \
Preserve qualifiers, hedges and numeric detail exactly. Do not add facts that are not in the text.";

const FULL_STAGE_NOTE: &str = " The excerpt keeps the introduction, section headings with their \
surrounding paragraphs, and the conclusion; weigh them accordingly.";

/// Which prompt a model call was made for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Primer,
    Full,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Stage::Primer => "primer",
            Stage::Full => "full",
        }
    }
}

/// System instructions for a stage and summary length
pub fn instructions_for(length: SummaryLength, stage: Stage) -> String {
    let base = match length {
        SummaryLength::Short => SHORT_INSTRUCTIONS,
        SummaryLength::Long => LONG_INSTRUCTIONS,
    };
    match stage {
        Stage::Primer => base.to_string(),
        Stage::Full => format!("{base}{FULL_STAGE_NOTE}"),
    }
}

fn char_prefix(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

enum RevealStep {
    Engine(Option<AppResult<String>>),
    Tick,
}

/// Re-emit a model's growing output `step` characters per `interval`.
///
/// Each item is the revealed prefix so far. The last item is the model's
/// complete output. An engine error ends the stream with that error. A zero
/// `interval` forwards the engine's items unchanged.
pub fn paced_reveal(
    mut engine: TextStream,
    step: usize,
    interval: Duration,
) -> impl Stream<Item = AppResult<String>> + Send + 'static {
    let step = step.max(1);

    async_stream::stream! {
        if interval.is_zero() {
            while let Some(item) = engine.next().await {
                let failed = item.is_err();
                yield item;
                if failed {
                    break;
                }
            }
            return;
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut latest = String::new();
        let mut latest_chars = 0usize;
        let mut shown = 0usize;
        let mut engine_done = false;

        loop {
            if engine_done && shown >= latest_chars {
                break;
            }

            let next = tokio::select! {
                item = engine.next(), if !engine_done => RevealStep::Engine(item),
                _ = ticker.tick(), if shown < latest_chars => RevealStep::Tick,
            };

            match next {
                RevealStep::Engine(Some(Ok(text))) => {
                    latest_chars = text.chars().count();
                    shown = shown.min(latest_chars);
                    latest = text;
                }
                RevealStep::Engine(Some(Err(e))) => {
                    yield Err(e);
                    break;
                }
                RevealStep::Engine(None) => engine_done = true,
                RevealStep::Tick => {
                    shown = (shown + step).min(latest_chars);
                    trace!("Revealed {}/{} chars", shown, latest_chars);
                    yield Ok(char_prefix(&latest, shown).to_string());
                }
            }
        }
    }
}

/// Produces and caches article summaries
#[derive(Clone)]
pub struct SummaryPipeline {
    model: Arc<dyn LanguageModel>,
    prefetcher: TextPrefetcher,
    summaries: Arc<SummaryStore>,
    config: SummaryConfig,
}

impl SummaryPipeline {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        prefetcher: TextPrefetcher,
        summaries: Arc<SummaryStore>,
        config: SummaryConfig,
    ) -> Self {
        Self {
            model,
            prefetcher,
            summaries,
            config,
        }
    }

    /// Length at which a primer is accepted without the full stage
    pub fn sufficient_chars(&self, length: SummaryLength) -> usize {
        match length {
            SummaryLength::Short => self.config.short_sufficient_chars,
            SummaryLength::Long => self.config.long_sufficient_chars,
        }
    }

    /// Stream a summary of `url`.
    ///
    /// Items are the summary text revealed so far. A cached summary is
    /// emitted once with no model call. When the model is unavailable or
    /// fails, or no article text can be obtained, the stream ends without
    /// producing anything. `seed_text` (typically the feed's own preview)
    /// is summarized when the page yields no readable text.
    pub fn summarize(
        &self,
        url: &str,
        length: SummaryLength,
        seed_text: Option<String>,
    ) -> BoxStream<'static, String> {
        let pipeline = self.clone();
        let key = SummaryKey::new(url, length);

        Box::pin(async_stream::stream! {
            if let Some(cached) = pipeline.summaries.get(&key) {
                debug!("Summary cache hit for {} ({})", key.link, length);
                yield cached;
                return;
            }

            if !pipeline.model.is_available().await {
                info!("Language model unavailable, no summary for {}", key.link);
                return;
            }

            let Some(text) = pipeline.article_text(&key.link, seed_text).await else {
                debug!("No text to summarize for {}", key.link);
                return;
            };

            // Primer stage
            let prompt = primer_slice(&text, pipeline.config.primer_max_chars);
            let mut primer = String::new();
            let mut revealed = pipeline.stage_stream(length, Stage::Primer, &prompt).await;
            while let Some(item) = revealed.next().await {
                match item {
                    Ok(partial) => {
                        primer.clone_from(&partial);
                        yield partial;
                    }
                    Err(e) => {
                        warn!("Primer generation failed for {}: {}", key.link, e);
                        return;
                    }
                }
            }

            let primer = primer.trim().to_string();
            if primer.is_empty() {
                debug!("Primer for {} came back empty", key.link);
                return;
            }
            pipeline.summaries.put(&key, &primer);

            let threshold = pipeline.sufficient_chars(length);
            let primer_chars = primer.chars().count();
            if primer_chars >= threshold {
                debug!(
                    "Primer for {} sufficient ({} >= {} chars)",
                    key.link, primer_chars, threshold
                );
                return;
            }

            // Full stage
            debug!(
                "Primer for {} too short ({} < {} chars), running full stage",
                key.link, primer_chars, threshold
            );
            let prompt = structure_slice(&text, pipeline.config.full_target_chars);
            let mut full = String::new();
            let mut revealed = pipeline.stage_stream(length, Stage::Full, &prompt).await;
            while let Some(item) = revealed.next().await {
                match item {
                    Ok(partial) => {
                        full.clone_from(&partial);
                        yield partial;
                    }
                    Err(e) => {
                        warn!("Full-stage generation failed for {}: {}", key.link, e);
                        return;
                    }
                }
            }

            let full = full.trim();
            if !full.is_empty() {
                pipeline.summaries.put(&key, full);
            }
        })
    }

    /// Start one model call and pace its output
    async fn stage_stream(
        &self,
        length: SummaryLength,
        stage: Stage,
        prompt: &str,
    ) -> BoxStream<'static, AppResult<String>> {
        let instructions = instructions_for(length, stage);
        trace!(
            "Starting {} stage with {} prompt chars",
            stage.as_str(),
            prompt.chars().count()
        );
        match self.model.stream_response(&instructions, prompt).await {
            Ok(engine) => Box::pin(paced_reveal(
                engine,
                self.config.reveal_step_chars,
                self.config.reveal_interval,
            )),
            Err(e) => Box::pin(futures::stream::once(async move { Err::<String, AppError>(e) })),
        }
    }

    async fn article_text(&self, url: &str, seed_text: Option<String>) -> Option<String> {
        match self.prefetcher.text_for(url).await {
            Ok(Some(text)) => return Some(text),
            Ok(None) => {}
            Err(e) => debug!(
                "Could not fetch {} for summary: {}",
                UrlUtils::obfuscate_credentials(url),
                e
            ),
        }
        seed_text
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn summaries(&self) -> &Arc<SummaryStore> {
        &self.summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ArticleTextCache, MemoryStore};
    use crate::errors::ModelError;
    use crate::sources::PageFetcher;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ARTICLE_URL: &str = "https://news.example/story";

    /// Replays one scripted response per call; an exhausted script fails
    struct ScriptedModel {
        responses: Mutex<Vec<String>>,
        calls: AtomicUsize,
        instructions: Mutex<Vec<String>>,
        available: bool,
        /// 1-based call whose stream stalls after its first chunk
        hang_on_call: Option<usize>,
    }

    impl ScriptedModel {
        fn new(responses: &[&str]) -> Arc<Self> {
            Self::build(responses, true, None)
        }

        fn build(responses: &[&str], available: bool, hang_on_call: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
                calls: AtomicUsize::new(0),
                instructions: Mutex::new(Vec::new()),
                available,
                hang_on_call,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn stream_response(&self, instructions: &str, _prompt: &str) -> AppResult<TextStream> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.instructions
                .lock()
                .unwrap()
                .push(instructions.to_string());
            let Some(response) = self.responses.lock().unwrap().pop() else {
                return Err(ModelError::GenerationFailed {
                    message: "script exhausted".into(),
                }
                .into());
            };

            // Emit in three growing chunks, like a token stream
            let cut = |n: usize| char_prefix(&response, n).to_string();
            let len = response.chars().count();
            let chunks = vec![Ok(cut(len / 3)), Ok(cut(2 * len / 3)), Ok(response.clone())];
            if self.hang_on_call == Some(call) {
                let first = futures::stream::iter(chunks.into_iter().take(1));
                return Ok(Box::pin(first.chain(futures::stream::pending())));
            }
            Ok(Box::pin(futures::stream::iter(chunks)))
        }

        async fn is_available(&self) -> bool {
            self.available
        }
    }

    struct StaticPage {
        html: Option<String>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl PageFetcher for StaticPage {
        async fn fetch_html(&self, url: &str, _timeout: Duration) -> AppResult<String> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.html
                .clone()
                .ok_or_else(|| crate::errors::SourceError::timeout(url).into())
        }

        async fn fetch_bytes(
            &self,
            url: &str,
            _headers: &[(String, String)],
            _timeout: Duration,
        ) -> AppResult<Vec<u8>> {
            Err(crate::errors::SourceError::timeout(url).into())
        }
    }

    fn article_html() -> String {
        "<html><body><article><p>The city council approved the new transit budget on Monday evening.</p>\
         <p>Officials expect construction on the first line to begin within eighteen months.</p>\
         </article></body></html>"
            .to_string()
    }

    async fn pipeline(model: Arc<ScriptedModel>, html: Option<String>) -> (SummaryPipeline, Arc<StaticPage>) {
        let store = Arc::new(MemoryStore::new());
        let texts = Arc::new(
            ArticleTextCache::load(store.clone(), "texts", 50, Duration::from_millis(300)).await,
        );
        let summaries = Arc::new(SummaryStore::load(store, "summaries", Duration::from_millis(300)).await);
        let page = Arc::new(StaticPage {
            html,
            fetches: AtomicUsize::new(0),
        });
        let prefetcher = TextPrefetcher::new(page.clone(), texts, Duration::from_secs(8));
        let config = SummaryConfig::default();
        (
            SummaryPipeline::new(model, prefetcher, summaries, config),
            page,
        )
    }

    fn sentence(chars: usize) -> String {
        let mut s = "The council approved the transit budget. ".repeat(chars / 40 + 1);
        s.truncate(chars);
        s.trim_end().to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_reveal_steps_through_text() {
        let engine: TextStream = Box::pin(futures::stream::iter(vec![
            Ok("Hello".to_string()),
            Ok("Hello world".to_string()),
        ]));
        let items: Vec<String> = paced_reveal(engine, 2, Duration::from_millis(30))
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(items.last().map(String::as_str), Some("Hello world"));
        assert!(items.windows(2).all(|w| w[1].starts_with(&w[0])));
        assert!(
            items
                .windows(2)
                .all(|w| w[1].chars().count() - w[0].chars().count() <= 2)
        );
    }

    #[tokio::test]
    async fn test_zero_interval_forwards_engine_chunks() {
        let engine: TextStream = Box::pin(futures::stream::iter(vec![
            Ok("Hello".to_string()),
            Ok("Hello world".to_string()),
        ]));
        let items: Vec<String> = paced_reveal(engine, 2, Duration::ZERO)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(items, vec!["Hello".to_string(), "Hello world".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_cache_is_idempotent_without_model_calls() {
        let primer = sentence(130);
        let model = ScriptedModel::new(&[&primer]);
        let (pipeline, _) = pipeline(model.clone(), Some(article_html())).await;

        let first: Vec<String> = pipeline.summarize(ARTICLE_URL, SummaryLength::Short, None).collect().await;
        assert_eq!(first.last(), Some(&primer));
        assert_eq!(model.calls(), 1);

        let second: Vec<String> = pipeline.summarize(ARTICLE_URL, SummaryLength::Short, None).collect().await;
        assert_eq!(second, vec![primer]);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sufficient_primer_skips_full_stage() {
        let primer = sentence(120);
        assert_eq!(primer.chars().count(), 120);
        let model = ScriptedModel::new(&[&primer, "never used"]);
        let (pipeline, _) = pipeline(model.clone(), Some(article_html())).await;

        let _: Vec<String> = pipeline.summarize(ARTICLE_URL, SummaryLength::Short, None).collect().await;

        assert_eq!(model.calls(), 1);
        let key = SummaryKey::new(ARTICLE_URL, SummaryLength::Short);
        assert_eq!(pipeline.summaries().get(&key), Some(primer));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_primer_runs_full_stage_and_overwrites() {
        let full = sentence(200);
        let model = ScriptedModel::new(&["Budget approved.", &full]);
        let (pipeline, _) = pipeline(model.clone(), Some(article_html())).await;

        let items: Vec<String> = pipeline.summarize(ARTICLE_URL, SummaryLength::Long, None).collect().await;

        assert_eq!(model.calls(), 2);
        assert_eq!(items.last(), Some(&full));
        let key = SummaryKey::new(ARTICLE_URL, SummaryLength::Long);
        assert_eq!(pipeline.summaries().get(&key), Some(full));

        let instructions = model.instructions.lock().unwrap().clone();
        assert_eq!(instructions[0], instructions_for(SummaryLength::Long, Stage::Primer));
        assert_eq!(instructions[1], instructions_for(SummaryLength::Long, Stage::Full));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_stream_caches_nothing() {
        let model = ScriptedModel::build(&[&sentence(150)], true, Some(1));
        let (pipeline, _) = pipeline(model.clone(), Some(article_html())).await;

        let mut stream = pipeline.summarize(ARTICLE_URL, SummaryLength::Short, None);
        let first = stream.next().await;
        assert!(first.is_some());
        drop(stream);

        assert!(!pipeline.summaries().has_cached_summary(ARTICLE_URL, SummaryLength::Short));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_full_stage_keeps_primer() {
        let model = ScriptedModel::build(&["Budget approved.", &sentence(200)], true, Some(2));
        let (pipeline, _) = pipeline(model.clone(), Some(article_html())).await;
        let key = SummaryKey::new(ARTICLE_URL, SummaryLength::Long);

        let mut stream = pipeline.summarize(ARTICLE_URL, SummaryLength::Long, None);
        while model.calls() < 2 {
            assert!(stream.next().await.is_some());
        }
        // A few more characters of the full stage, then the reader goes away
        let partial = stream.next().await.unwrap();
        assert!(!partial.is_empty());
        assert_eq!(
            pipeline.summaries().get(&key).as_deref(),
            Some("Budget approved.")
        );
        drop(stream);

        assert_eq!(
            pipeline.summaries().get(&key).as_deref(),
            Some("Budget approved.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_model_yields_nothing() {
        let model = ScriptedModel::build(&["unused"], false, None);
        let (pipeline, page) = pipeline(model.clone(), Some(article_html())).await;

        let items: Vec<String> = pipeline.summarize(ARTICLE_URL, SummaryLength::Short, None).collect().await;
        assert!(items.is_empty());
        assert_eq!(model.calls(), 0);
        assert_eq!(page.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_failure_caches_nothing() {
        let model = ScriptedModel::new(&[]);
        let (pipeline, _) = pipeline(model.clone(), Some(article_html())).await;

        let items: Vec<String> = pipeline.summarize(ARTICLE_URL, SummaryLength::Short, None).collect().await;
        assert!(items.is_empty());
        assert_eq!(model.calls(), 1);
        assert!(!pipeline.summaries().has_cached_summary(ARTICLE_URL, SummaryLength::Short));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seed_text_used_when_page_unreachable() {
        let primer = sentence(130);
        let model = ScriptedModel::new(&[&primer]);
        let (pipeline, page) = pipeline(model.clone(), None).await;

        let none: Vec<String> = pipeline.summarize(ARTICLE_URL, SummaryLength::Short, None).collect().await;
        assert!(none.is_empty());
        assert_eq!(model.calls(), 0);

        let seeded: Vec<String> = pipeline
            .summarize(
                ARTICLE_URL,
                SummaryLength::Short,
                Some("Council approves a transit budget worth two billion.".into()),
            )
            .collect()
            .await;
        assert_eq!(seeded.last(), Some(&primer));
        assert_eq!(page.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extracted_text_is_cached_as_side_effect() {
        let model = ScriptedModel::new(&[&sentence(130)]);
        let (pipeline, _) = pipeline(model, Some(article_html())).await;

        let _: Vec<String> = pipeline.summarize(ARTICLE_URL, SummaryLength::Short, None).collect().await;

        let text = pipeline.prefetcher.texts().get(ARTICLE_URL).unwrap();
        assert!(text.starts_with("The city council approved"));
    }
}
