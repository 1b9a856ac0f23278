//! Centralized error handling for feedbrief
//!
//! Errors are grouped by the layer that produces them so callers can decide
//! what to swallow and what to surface.
//!
//! # Error Categories
//!
//! - **Source Errors**: feed and page fetching, HTTP status, unsupported formats
//! - **Cache Errors**: persistence, (de)serialization, image processing
//! - **Model Errors**: language model availability and generation failures
//!
//! # Usage
//!
//! ```rust
//! use feedbrief::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Err(AppError::validation("empty url"))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Cache Results
pub type CacheResult<T> = Result<T, CacheError>;
