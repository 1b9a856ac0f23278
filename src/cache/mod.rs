//! Persistent caches for derived article artifacts
//!
//! Each cache owns its map behind a mutex, so every read-modify-write on it
//! is serialized, and persists the whole map as one blob through a
//! [`KeyValueStore`] with debounced writes.

pub mod article_text;
pub mod store;
pub mod summary_store;
pub mod thumbnail;

pub use article_text::ArticleTextCache;
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use summary_store::SummaryStore;
pub use thumbnail::ThumbnailCache;
