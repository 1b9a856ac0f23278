//! Article text cache: article link -> extracted readable text
//!
//! Bounded by entry count. Overflow is trimmed by removing the first
//! `overflow` keys in map iteration order, which is effectively arbitrary:
//! there is no recency or insertion-order signal. The key being inserted is
//! never the one evicted.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::store::KeyValueStore;
use crate::utils::debounce::{Debouncer, Flush};

struct TextCacheInner {
    entries: Mutex<HashMap<String, String>>,
    /// Held across snapshot and persist so flushes land in order
    flush_lock: tokio::sync::Mutex<()>,
    capacity: usize,
    store: Arc<dyn KeyValueStore>,
    store_key: String,
}

impl TextCacheInner {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Flush for TextCacheInner {
    async fn flush(&self) {
        let _writing = self.flush_lock.lock().await;
        let snapshot = {
            let entries = self.entries();
            serde_json::to_vec(&*entries)
        };
        match snapshot {
            Ok(bytes) => {
                if let Err(e) = self.store.persist(&self.store_key, &bytes).await {
                    warn!("Failed to persist article text cache: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize article text cache: {}", e),
        }
    }
}

/// Remove `overflow` entries, skipping `keep`
fn prune(entries: &mut HashMap<String, String>, capacity: usize, keep: Option<&str>) -> usize {
    let overflow = entries.len().saturating_sub(capacity);
    if overflow == 0 {
        return 0;
    }
    let victims: Vec<String> = entries
        .keys()
        .filter(|k| Some(k.as_str()) != keep)
        .take(overflow)
        .cloned()
        .collect();
    for key in &victims {
        entries.remove(key);
    }
    victims.len()
}

/// Persistent cache of extracted article text
pub struct ArticleTextCache {
    inner: Arc<TextCacheInner>,
    debouncer: Debouncer,
}

impl ArticleTextCache {
    /// Load the persisted map. Unreadable snapshots start an empty cache.
    pub async fn load(
        store: Arc<dyn KeyValueStore>,
        store_key: &str,
        capacity: usize,
        flush_debounce: Duration,
    ) -> Self {
        let capacity = capacity.max(1);
        let mut entries: HashMap<String, String> = match store.load(store_key).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("Discarding unreadable article text cache: {}", e);
                HashMap::new()
            }),
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!("Failed to load article text cache: {}", e);
                HashMap::new()
            }
        };
        entries.retain(|_, text| !text.is_empty());

        let pruned = prune(&mut entries, capacity, None);
        info!(
            "Article text cache loaded: {} entries (pruned {})",
            entries.len(),
            pruned
        );

        let inner = Arc::new(TextCacheInner {
            entries: Mutex::new(entries),
            flush_lock: tokio::sync::Mutex::new(()),
            capacity,
            store,
            store_key: store_key.to_string(),
        });
        let debouncer = Debouncer::spawn("article_text", flush_debounce, inner.clone());
        if pruned > 0 {
            debouncer.mark_dirty();
        }

        Self { inner, debouncer }
    }

    pub fn get(&self, url: &str) -> Option<String> {
        self.inner.entries().get(url).cloned()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.inner.entries().contains_key(url)
    }

    /// Store text for `url`. Empty (or whitespace-only) text is ignored.
    pub fn put(&self, url: &str, text: &str) {
        if text.trim().is_empty() {
            debug!("Not caching empty text for {}", url);
            return;
        }
        {
            let mut entries = self.inner.entries();
            entries.insert(url.to_string(), text.to_string());
            let pruned = prune(&mut entries, self.inner.capacity, Some(url));
            if pruned > 0 {
                debug!("Article text cache over capacity, evicted {}", pruned);
            }
        }
        self.debouncer.mark_dirty();
    }

    pub fn remove(&self, url: &str) -> bool {
        let removed = self.inner.entries().remove(url).is_some();
        if removed {
            self.debouncer.mark_dirty();
        }
        removed
    }

    pub fn clear(&self) {
        self.inner.entries().clear();
        self.debouncer.mark_dirty();
    }

    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Persist now instead of waiting for the debounce window
    pub async fn flush(&self) {
        self.debouncer.clear_dirty();
        self.inner.flush().await;
    }
}
