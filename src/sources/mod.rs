//! Outbound collaborators: feed sources and page fetching
//!
//! Feed parsing is not part of this crate; callers plug their own
//! [`FeedSource`]. Page fetching ships with a `reqwest` implementation.

pub mod http;
pub mod memory;
pub mod traits;

pub use http::HttpPageFetcher;
pub use memory::StaticFeedSource;
pub use traits::{FeedSource, PageFetcher};
