//! Summary cache: (link, length) -> summary text, plus expansion flags
//!
//! Expansion flags live in their own set under the same keys so UI state
//! survives a summary being cleared. Both collections sit behind one lock:
//! `clear_cache` wipes them together and readers never observe one without
//! the other.
//!
//! `has_cached_summary` is synchronous on purpose; UI code calls it to pick
//! a button state without awaiting anything.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::store::KeyValueStore;
use crate::models::{SummaryKey, SummaryLength, SummaryRecord};
use crate::utils::debounce::{Debouncer, Flush};

#[derive(Debug, Default, Serialize, Deserialize)]
struct SummarySnapshot {
    #[serde(default)]
    summaries: HashMap<String, String>,
    #[serde(default)]
    expanded: HashSet<String>,
}

struct SummaryInner {
    state: Mutex<SummarySnapshot>,
    /// Held across snapshot and persist so flushes land in order
    flush_lock: tokio::sync::Mutex<()>,
    store: Arc<dyn KeyValueStore>,
    store_key: String,
}

impl SummaryInner {
    fn state(&self) -> MutexGuard<'_, SummarySnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Flush for SummaryInner {
    async fn flush(&self) {
        let _writing = self.flush_lock.lock().await;
        let snapshot = {
            let state = self.state();
            serde_json::to_vec(&*state)
        };
        match snapshot {
            Ok(bytes) => {
                if let Err(e) = self.store.persist(&self.store_key, &bytes).await {
                    warn!("Failed to persist summary cache: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize summary cache: {}", e),
        }
    }
}

/// Persistent store of generated summaries
pub struct SummaryStore {
    inner: Arc<SummaryInner>,
    debouncer: Debouncer,
}

impl SummaryStore {
    pub async fn load(
        store: Arc<dyn KeyValueStore>,
        store_key: &str,
        flush_debounce: Duration,
    ) -> Self {
        let snapshot = match store.load(store_key).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("Discarding unreadable summary cache: {}", e);
                SummarySnapshot::default()
            }),
            Ok(None) => SummarySnapshot::default(),
            Err(e) => {
                warn!("Failed to load summary cache: {}", e);
                SummarySnapshot::default()
            }
        };
        info!(
            "Summary cache loaded: {} summaries, {} expansion flags",
            snapshot.summaries.len(),
            snapshot.expanded.len()
        );

        let inner = Arc::new(SummaryInner {
            state: Mutex::new(snapshot),
            flush_lock: tokio::sync::Mutex::new(()),
            store,
            store_key: store_key.to_string(),
        });
        let debouncer = Debouncer::spawn("summaries", flush_debounce, inner.clone());
        Self { inner, debouncer }
    }

    pub fn get(&self, key: &SummaryKey) -> Option<String> {
        self.inner.state().summaries.get(&key.storage_key()).cloned()
    }

    /// Cache-only existence check, never suspends
    pub fn has_cached_summary(&self, link: &str, length: SummaryLength) -> bool {
        let key = SummaryKey::new(link, length).storage_key();
        self.inner.state().summaries.contains_key(&key)
    }

    /// Store or overwrite a summary. Blank text is ignored.
    pub fn put(&self, key: &SummaryKey, text: &str) {
        if text.trim().is_empty() {
            debug!("Not caching empty {} summary for {}", key.length, key.link);
            return;
        }
        self.inner
            .state()
            .summaries
            .insert(key.storage_key(), text.to_string());
        self.debouncer.mark_dirty();
    }

    pub fn record(&self, key: &SummaryKey) -> SummaryRecord {
        let storage_key = key.storage_key();
        let state = self.inner.state();
        SummaryRecord {
            text: state.summaries.get(&storage_key).cloned(),
            expanded: state.expanded.contains(&storage_key),
        }
    }

    pub fn is_expanded(&self, key: &SummaryKey) -> bool {
        self.inner.state().expanded.contains(&key.storage_key())
    }

    pub fn set_expanded(&self, key: &SummaryKey, expanded: bool) {
        let changed = {
            let mut state = self.inner.state();
            if expanded {
                state.expanded.insert(key.storage_key())
            } else {
                state.expanded.remove(&key.storage_key())
            }
        };
        if changed {
            self.debouncer.mark_dirty();
        }
    }

    /// Remove one summary; the expansion flag survives unless asked otherwise
    pub fn clear_summary(&self, key: &SummaryKey, clear_expansion: bool) {
        {
            let storage_key = key.storage_key();
            let mut state = self.inner.state();
            state.summaries.remove(&storage_key);
            if clear_expansion {
                state.expanded.remove(&storage_key);
            }
        }
        self.debouncer.mark_dirty();
    }

    /// Wipe every summary and every expansion flag
    pub fn clear_cache(&self) {
        {
            let mut state = self.inner.state();
            state.summaries.clear();
            state.expanded.clear();
        }
        self.debouncer.mark_dirty();
    }

    pub fn len(&self) -> usize {
        self.inner.state().summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state().summaries.is_empty()
    }

    pub async fn flush(&self) {
        self.debouncer.clear_dirty();
        self.inner.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::{FileStore, MemoryStore};

    const KEY: &str = "summary_cache";

    async fn store_with(backing: &MemoryStore) -> SummaryStore {
        SummaryStore::load(Arc::new(backing.clone()), KEY, Duration::from_millis(300)).await
    }

    #[tokio::test]
    async fn test_lengths_are_independent() {
        let store = store_with(&MemoryStore::new()).await;
        let short = SummaryKey::new("https://a.example/x", SummaryLength::Short);
        let long = SummaryKey::new("https://a.example/x", SummaryLength::Long);

        store.put(&short, "Short one.");
        assert!(store.has_cached_summary("https://a.example/x", SummaryLength::Short));
        assert!(!store.has_cached_summary("https://a.example/x", SummaryLength::Long));
        assert_eq!(store.get(&long), None);

        store.put(&long, "A much longer one.");
        assert_eq!(store.get(&short).as_deref(), Some("Short one."));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_expansion_survives_summary_clear() {
        let store = store_with(&MemoryStore::new()).await;
        let key = SummaryKey::new("u", SummaryLength::Long);
        store.put(&key, "text");
        store.set_expanded(&key, true);

        store.clear_summary(&key, false);
        assert_eq!(
            store.record(&key),
            SummaryRecord {
                text: None,
                expanded: true
            }
        );

        store.clear_summary(&key, true);
        assert!(!store.is_expanded(&key));
    }

    #[tokio::test]
    async fn test_clear_cache_wipes_both() {
        let store = store_with(&MemoryStore::new()).await;
        let key = SummaryKey::new("u", SummaryLength::Short);
        store.put(&key, "text");
        store.set_expanded(&key, true);

        store.clear_cache();
        assert_eq!(store.record(&key), SummaryRecord::default());
    }

    #[tokio::test]
    async fn test_blank_summary_not_stored() {
        let store = store_with(&MemoryStore::new()).await;
        let key = SummaryKey::new("u", SummaryLength::Short);
        store.put(&key, "  \n");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_persists_and_reloads() {
        let backing = MemoryStore::new();
        let key = SummaryKey::new("u", SummaryLength::Long);
        {
            let store = store_with(&backing).await;
            store.put(&key, "Persisted summary.");
            store.set_expanded(&key, true);
            store.flush().await;
        }
        let store = store_with(&backing).await;
        assert_eq!(store.get(&key).as_deref(), Some("Persisted summary."));
        assert!(store.is_expanded(&key));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_flushes_keep_latest_state() {
        let dir = tempfile::tempdir().unwrap();
        let backing = Arc::new(FileStore::open(dir.path()).await.unwrap());
        let first = SummaryKey::new("https://a.example/1", SummaryLength::Short);
        let second = SummaryKey::new("https://a.example/2", SummaryLength::Short);
        {
            let store = SummaryStore::load(backing.clone(), KEY, Duration::from_secs(60)).await;
            store.put(&first, "First.");
            tokio::join!(store.flush(), async {
                store.put(&second, "Second.");
                store.flush().await;
            });
        }

        let store = SummaryStore::load(backing, KEY, Duration::from_secs(60)).await;
        assert_eq!(store.get(&first).as_deref(), Some("First."));
        assert_eq!(store.get(&second).as_deref(), Some("Second."));
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_discarded() {
        let backing = MemoryStore::new();
        backing.persist(KEY, b"[1, 2").await.unwrap();
        let store = store_with(&backing).await;
        assert!(store.is_empty());
    }
}
