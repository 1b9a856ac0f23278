/// Configuration default values
///
/// All tunables live here so they can be changed in one place.
// Storage defaults
pub const DEFAULT_DATA_DIR: &str = "./data/feedbrief";
pub const DEFAULT_TEXT_CACHE_KEY: &str = "article_text_cache";
pub const DEFAULT_SUMMARY_CACHE_KEY: &str = "summary_cache";
pub const DEFAULT_THUMBNAIL_CACHE_KEY: &str = "thumbnail_cache";

// Refresh defaults
pub const DEFAULT_FEED_CONCURRENCY: usize = 2;
pub const DEFAULT_ARTICLE_CONCURRENCY: usize = 3;
pub const DEFAULT_ARTICLE_BATCH_SIZE: usize = 3;
pub const DEFAULT_BATCH_PAUSE_MS: u64 = 150;
pub const DEFAULT_ITEM_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_GLOBAL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_COOLDOWN_MS: u64 = 1500;
pub const DEFAULT_HTML_TIMEOUT_SECS: u64 = 8;

// Summary defaults
pub const DEFAULT_PRIMER_MAX_CHARS: usize = 1200;
pub const DEFAULT_FULL_TARGET_CHARS: usize = 8000;
pub const DEFAULT_SHORT_SUFFICIENT_CHARS: usize = 120;
pub const DEFAULT_LONG_SUFFICIENT_CHARS: usize = 160;
pub const DEFAULT_REVEAL_STEP_CHARS: usize = 2;
pub const DEFAULT_REVEAL_INTERVAL_MS: u64 = 30;

// Cache defaults
pub const DEFAULT_TEXT_CACHE_CAPACITY: usize = 500;
pub const DEFAULT_THUMBNAIL_CAPACITY: usize = 150;
pub const DEFAULT_THUMBNAIL_MAX_DIMENSION: u32 = 300;
pub const DEFAULT_THUMBNAIL_QUALITY: u8 = 80;
pub const DEFAULT_FLUSH_DEBOUNCE_MS: u64 = 300;

// Thumbnail download defaults
pub const DEFAULT_THUMBNAIL_RETRY_TIMEOUTS_SECS: [u64; 2] = [15, 20];
pub const DEFAULT_THUMBNAIL_RETRY_DELAY_MS: u64 = 500;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

// Model defaults
pub const DEFAULT_MODEL_ENDPOINT: &str = "http://localhost:11434/v1";
pub const DEFAULT_MODEL_NAME: &str = "llama3.2";
pub const DEFAULT_MODEL_API_KEY_ENV: &str = "FEEDBRIEF_MODEL_API_KEY";
