//! Language model abstraction used by the summary pipeline

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::{AppResult, ModelError};

/// Growing response text: every item is the full string generated so far
pub type TextStream = BoxStream<'static, AppResult<String>>;

/// Black-box text generator
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Start generating a response to `prompt` under `instructions`.
    ///
    /// Dropping the returned stream abandons the generation.
    async fn stream_response(&self, instructions: &str, prompt: &str) -> AppResult<TextStream>;

    /// Whether the model can currently serve requests
    async fn is_available(&self) -> bool {
        true
    }
}

/// Stand-in used when no model endpoint is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableModel;

#[async_trait]
impl LanguageModel for UnavailableModel {
    async fn stream_response(&self, _instructions: &str, _prompt: &str) -> AppResult<TextStream> {
        Err(ModelError::unavailable("no language model configured").into())
    }

    async fn is_available(&self) -> bool {
        false
    }
}
