//! Data model shared by the refresh pipeline, the caches and the summarizer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A feed to refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRef {
    pub id: String,
    pub title: String,
    pub url: String,
    pub icon_url: Option<String>,
}

impl FeedRef {
    pub fn new<I: Into<String>, U: Into<String>>(id: I, url: U) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            url: url.into(),
            icon_url: None,
        }
    }
}

/// An article as produced by a feed source for one fetch.
///
/// `link` is the primary key of every cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRef {
    pub id: String,
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary_preview: Option<String>,
    pub thumbnail_url: Option<String>,
    pub source_id: String,
    pub source_title: String,
    pub source_icon_url: Option<String>,
}

impl ArticleRef {
    /// Minimal article attached to `feed`, used by sources that only know links
    pub fn for_feed<T: Into<String>, L: Into<String>>(feed: &FeedRef, title: T, link: L) -> Self {
        let link = link.into();
        Self {
            id: link.clone(),
            title: title.into(),
            link,
            published_at: None,
            summary_preview: None,
            thumbnail_url: None,
            source_id: feed.id.clone(),
            source_title: feed.title.clone(),
            source_icon_url: feed.icon_url.clone(),
        }
    }
}

/// Requested summary size. Short and long summaries are cached independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    Short,
    Long,
}

impl SummaryLength {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryLength::Short => "short",
            SummaryLength::Long => "long",
        }
    }
}

impl fmt::Display for SummaryLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache key for a summary: article link plus length
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SummaryKey {
    pub link: String,
    pub length: SummaryLength,
}

impl SummaryKey {
    pub fn new<L: Into<String>>(link: L, length: SummaryLength) -> Self {
        Self {
            link: link.into(),
            length,
        }
    }

    /// Flat string form used as the map key in persisted snapshots
    pub fn storage_key(&self) -> String {
        format!("{}|{}", self.length.as_str(), self.link)
    }
}

/// Cached summary text plus the UI expansion flag for the same key
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SummaryRecord {
    pub text: Option<String>,
    pub expanded: bool,
}

/// An RGB triple, used for dominant thumbnail colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// A cached, already-compressed thumbnail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailImage {
    /// JPEG bytes
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Progress and outcome counters for a refresh run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshStats {
    /// Feeds finished (successfully or not)
    pub completed: usize,
    /// Feeds in the run
    pub total: usize,
    /// Articles whose text was fetched and stored in this run
    pub articles_cached: usize,
    /// Articles whose text was already cached
    pub articles_skipped: usize,
    /// Articles whose prefetch failed or timed out
    pub articles_failed: usize,
}

impl RefreshStats {
    pub fn is_finished(&self) -> bool {
        self.completed >= self.total
    }
}
