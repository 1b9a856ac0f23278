//! Utility modules shared across the pipeline
//!
//! Small, dependency-light helpers: URL handling, timeout races and
//! debounced persistence.

pub mod debounce;
pub mod timeout;
pub mod url;

pub use debounce::{Debouncer, Flush};
pub use timeout::{TimedOut, race_timeout};
pub use url::UrlUtils;
