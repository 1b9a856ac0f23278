//! feedbrief: feed refresh, article text extraction, streaming summaries
//! and bounded caches for offline reading.

pub mod app;
pub mod cache;
pub mod config;
pub mod errors;
pub mod extract;
pub mod llm;
pub mod models;
pub mod services;
pub mod sources;
pub mod utils;

pub use app::{Collaborators, FeedBrief};
pub use config::Config;
pub use errors::{AppError, AppResult};
