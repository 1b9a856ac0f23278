//! Language model access

pub mod openai;
pub mod traits;

pub use openai::OpenAiCompatibleModel;
pub use traits::{LanguageModel, TextStream, UnavailableModel};
