//! Services layer
//!
//! Concurrency control, article prefetch, feed refresh orchestration and
//! the two-stage summary pipeline.

pub mod concurrency_gate;
pub mod prefetch;
pub mod refresh;
pub mod summary_pipeline;

pub use concurrency_gate::{ConcurrencyGate, GatePermit};
pub use prefetch::{PrefetchOutcome, TextPrefetcher};
pub use refresh::RefreshOrchestrator;
pub use summary_pipeline::SummaryPipeline;
