//! Error type definitions for feedbrief
//!
//! Transient failures (fetch timeouts, bad status codes, unreadable cache
//! blobs) are recovered close to where they happen. These types exist so
//! that recovery code can log something precise before moving on.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Feed or page source errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Cache persistence and processing errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Language model errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Operation already in progress errors
    #[error("Operation already in progress: {operation_type} on {resource}")]
    OperationInProgress {
        operation_type: String,
        resource: String,
    },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Feed and page fetching errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// Request did not finish in time
    #[error("Connection timeout: {url}")]
    Timeout { url: String },

    /// Non-success HTTP status
    #[error("HTTP error: {status} - {url}")]
    Http { status: u16, url: String },

    /// Content that this pipeline refuses to process
    #[error("Unsupported format: {format} for {url}")]
    UnsupportedFormat { format: String, url: String },
}

/// Cache persistence and image processing errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Snapshot (de)serialization failures
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Image decode/encode failures
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    /// Backing store failures
    #[error("Store failure for key {key}: {message}")]
    Store { key: String, message: String },
}

/// Language model errors
#[derive(Error, Debug)]
pub enum ModelError {
    /// No model is configured or reachable
    #[error("Language model unavailable: {reason}")]
    Unavailable { reason: String },

    /// The model started but failed to produce output
    #[error("Generation failed: {message}")]
    GenerationFailed { message: String },

    /// Streaming payload could not be decoded
    #[error("Malformed stream event: {message}")]
    MalformedStream { message: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an operation in progress error
    pub fn operation_in_progress<O: Into<String>, R: Into<String>>(
        operation_type: O,
        resource: R,
    ) -> Self {
        Self::OperationInProgress {
            operation_type: operation_type.into(),
            resource: resource.into(),
        }
    }

    /// Whether the failure is a timeout anywhere down the chain
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Source(SourceError::Timeout { .. }) => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

impl SourceError {
    /// Create a timeout error for a URL
    pub fn timeout<S: Into<String>>(url: S) -> Self {
        Self::Timeout { url: url.into() }
    }
}

impl CacheError {
    /// Create a store error
    pub fn store<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self::Store {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl ModelError {
    /// Create an unavailable error
    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}
