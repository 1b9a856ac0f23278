use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;
use duration_serde::{duration, duration_list};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub thumbnails: ThumbnailDownloadConfig,
    pub model: Option<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_text_cache_key")]
    pub text_cache_key: String,
    #[serde(default = "default_summary_cache_key")]
    pub summary_cache_key: String,
    #[serde(default = "default_thumbnail_cache_key")]
    pub thumbnail_cache_key: String,
}

/// Limits and timers for a feed refresh run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Feeds fetched at the same time
    #[serde(default = "default_feed_concurrency")]
    pub feed_concurrency: usize,
    /// Article pages prefetched at the same time
    #[serde(default = "default_article_concurrency")]
    pub article_concurrency: usize,
    /// Articles started per batch before pausing
    #[serde(default = "default_article_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_pause", with = "duration")]
    pub batch_pause: Duration,
    /// Upper bound for a single article prefetch
    #[serde(default = "default_item_timeout", with = "duration")]
    pub item_timeout: Duration,
    /// Upper bound for the whole run
    #[serde(default = "default_global_timeout", with = "duration")]
    pub global_timeout: Duration,
    /// Minimum gap between the end of one run and the start of the next
    #[serde(default = "default_cooldown", with = "duration")]
    pub cooldown: Duration,
    /// Timeout handed to the page fetcher for article HTML
    #[serde(default = "default_html_timeout", with = "duration")]
    pub html_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "default_primer_max_chars")]
    pub primer_max_chars: usize,
    #[serde(default = "default_full_target_chars")]
    pub full_target_chars: usize,
    /// Primer length at which a short summary is considered good enough
    #[serde(default = "default_short_sufficient_chars")]
    pub short_sufficient_chars: usize,
    /// Primer length at which a long summary is considered good enough
    #[serde(default = "default_long_sufficient_chars")]
    pub long_sufficient_chars: usize,
    #[serde(default = "default_reveal_step_chars")]
    pub reveal_step_chars: usize,
    /// Zero forwards model output as it arrives, without pacing
    #[serde(default = "default_reveal_interval", with = "duration")]
    pub reveal_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_text_cache_capacity")]
    pub text_capacity: usize,
    #[serde(default = "default_thumbnail_capacity")]
    pub thumbnail_capacity: usize,
    #[serde(default = "default_thumbnail_max_dimension")]
    pub thumbnail_max_dimension: u32,
    /// JPEG quality, 1-100
    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,
    #[serde(default = "default_flush_debounce", with = "duration")]
    pub flush_debounce: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailDownloadConfig {
    /// One attempt per entry, each with its own timeout
    #[serde(default = "default_retry_timeouts", with = "duration_list")]
    pub retry_timeouts: Vec<Duration>,
    #[serde(default = "default_retry_delay", with = "duration")]
    pub retry_delay: Duration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Fixed referer; when unset the image's own origin is sent
    pub referer: Option<String>,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
}

/// OpenAI-compatible chat completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model_name")]
    pub model: String,
    /// Environment variable holding the bearer token, if any
    #[serde(default = "default_model_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model_timeout", with = "duration")]
    pub request_timeout: Duration,
}

// Storage defaults
fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

fn default_text_cache_key() -> String {
    DEFAULT_TEXT_CACHE_KEY.to_string()
}

fn default_summary_cache_key() -> String {
    DEFAULT_SUMMARY_CACHE_KEY.to_string()
}

fn default_thumbnail_cache_key() -> String {
    DEFAULT_THUMBNAIL_CACHE_KEY.to_string()
}

// Refresh defaults
fn default_feed_concurrency() -> usize {
    DEFAULT_FEED_CONCURRENCY
}

fn default_article_concurrency() -> usize {
    DEFAULT_ARTICLE_CONCURRENCY
}

fn default_article_batch_size() -> usize {
    DEFAULT_ARTICLE_BATCH_SIZE
}

fn default_batch_pause() -> Duration {
    Duration::from_millis(DEFAULT_BATCH_PAUSE_MS)
}

fn default_item_timeout() -> Duration {
    Duration::from_secs(DEFAULT_ITEM_TIMEOUT_SECS)
}

fn default_global_timeout() -> Duration {
    Duration::from_secs(DEFAULT_GLOBAL_TIMEOUT_SECS)
}

fn default_cooldown() -> Duration {
    Duration::from_millis(DEFAULT_COOLDOWN_MS)
}

fn default_html_timeout() -> Duration {
    Duration::from_secs(DEFAULT_HTML_TIMEOUT_SECS)
}

// Summary defaults
fn default_primer_max_chars() -> usize {
    DEFAULT_PRIMER_MAX_CHARS
}

fn default_full_target_chars() -> usize {
    DEFAULT_FULL_TARGET_CHARS
}

fn default_short_sufficient_chars() -> usize {
    DEFAULT_SHORT_SUFFICIENT_CHARS
}

fn default_long_sufficient_chars() -> usize {
    DEFAULT_LONG_SUFFICIENT_CHARS
}

fn default_reveal_step_chars() -> usize {
    DEFAULT_REVEAL_STEP_CHARS
}

fn default_reveal_interval() -> Duration {
    Duration::from_millis(DEFAULT_REVEAL_INTERVAL_MS)
}

// Cache defaults
fn default_text_cache_capacity() -> usize {
    DEFAULT_TEXT_CACHE_CAPACITY
}

fn default_thumbnail_capacity() -> usize {
    DEFAULT_THUMBNAIL_CAPACITY
}

fn default_thumbnail_max_dimension() -> u32 {
    DEFAULT_THUMBNAIL_MAX_DIMENSION
}

fn default_thumbnail_quality() -> u8 {
    DEFAULT_THUMBNAIL_QUALITY
}

fn default_flush_debounce() -> Duration {
    Duration::from_millis(DEFAULT_FLUSH_DEBOUNCE_MS)
}

// Thumbnail download defaults
fn default_retry_timeouts() -> Vec<Duration> {
    DEFAULT_THUMBNAIL_RETRY_TIMEOUTS_SECS
        .iter()
        .map(|s| Duration::from_secs(*s))
        .collect()
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(DEFAULT_THUMBNAIL_RETRY_DELAY_MS)
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_accept_language() -> String {
    DEFAULT_ACCEPT_LANGUAGE.to_string()
}

// Model defaults
fn default_model_endpoint() -> String {
    DEFAULT_MODEL_ENDPOINT.to_string()
}

fn default_model_name() -> String {
    DEFAULT_MODEL_NAME.to_string()
}

fn default_model_api_key_env() -> String {
    DEFAULT_MODEL_API_KEY_ENV.to_string()
}

fn default_model_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            text_cache_key: default_text_cache_key(),
            summary_cache_key: default_summary_cache_key(),
            thumbnail_cache_key: default_thumbnail_cache_key(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            feed_concurrency: default_feed_concurrency(),
            article_concurrency: default_article_concurrency(),
            batch_size: default_article_batch_size(),
            batch_pause: default_batch_pause(),
            item_timeout: default_item_timeout(),
            global_timeout: default_global_timeout(),
            cooldown: default_cooldown(),
            html_timeout: default_html_timeout(),
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            primer_max_chars: default_primer_max_chars(),
            full_target_chars: default_full_target_chars(),
            short_sufficient_chars: default_short_sufficient_chars(),
            long_sufficient_chars: default_long_sufficient_chars(),
            reveal_step_chars: default_reveal_step_chars(),
            reveal_interval: default_reveal_interval(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            text_capacity: default_text_cache_capacity(),
            thumbnail_capacity: default_thumbnail_capacity(),
            thumbnail_max_dimension: default_thumbnail_max_dimension(),
            thumbnail_quality: default_thumbnail_quality(),
            flush_debounce: default_flush_debounce(),
        }
    }
}

impl Default for ThumbnailDownloadConfig {
    fn default() -> Self {
        Self {
            retry_timeouts: default_retry_timeouts(),
            retry_delay: default_retry_delay(),
            user_agent: default_user_agent(),
            referer: None,
            accept_language: default_accept_language(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_model_endpoint(),
            model: default_model_name(),
            api_key_env: default_model_api_key_env(),
            request_timeout: default_model_timeout(),
        }
    }
}

impl Config {
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            let config: Self = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            Ok(default_config)
        }
    }

    /// Reject values that would stall or disable the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.refresh.feed_concurrency == 0 || self.refresh.article_concurrency == 0 {
            anyhow::bail!("refresh concurrency limits must be at least 1");
        }
        if self.refresh.batch_size == 0 {
            anyhow::bail!("refresh.batch_size must be at least 1");
        }
        if self.cache.thumbnail_capacity == 0 || self.cache.text_capacity == 0 {
            anyhow::bail!("cache capacities must be at least 1");
        }
        if !(1..=100).contains(&self.cache.thumbnail_quality) {
            anyhow::bail!("cache.thumbnail_quality must be between 1 and 100");
        }
        if self.thumbnails.retry_timeouts.is_empty() {
            anyhow::bail!("thumbnails.retry_timeouts needs at least one entry");
        }
        Ok(())
    }
}
