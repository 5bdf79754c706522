//! Error Handling Module
//!
//! Defines the error type for the TumorScan library.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for TumorScan operations
#[derive(Error, Debug)]
pub enum TumorScanError {
    /// The uploaded file contained no bytes
    #[error("Uploaded file is empty")]
    EmptyUpload,

    /// The uploaded file is not a jpg, jpeg or png image
    #[error("Unsupported image type '{0}' (expected jpg, jpeg or png)")]
    UnsupportedImageType(String),

    /// The image bytes could not be decoded
    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    /// A weight record was not found on disk
    #[error("Model weights not found: {0}")]
    WeightsNotFound(PathBuf),

    /// A weight record could not be loaded or saved
    #[error("Model error: {0}")]
    ModelLoad(String),

    /// Error while running the classifier
    #[error("Inference error: {0}")]
    Inference(String),

    /// Error while computing the saliency map
    #[error("Saliency error: {0}")]
    Saliency(String),

    /// The explanation service answered without usable text
    #[error("Explanation error: {0}")]
    Explanation(String),

    /// No API key is configured for the explanation service
    #[error("Explanation service is not configured (set GOOGLE_API_KEY)")]
    ExplainerNotConfigured,

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TumorScanError {
    /// Whether the error was caused by the uploaded input rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TumorScanError::EmptyUpload
                | TumorScanError::UnsupportedImageType(_)
                | TumorScanError::ImageDecode(_)
        )
    }
}

impl From<serde_json::Error> for TumorScanError {
    fn from(err: serde_json::Error) -> Self {
        TumorScanError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for TumorScanError {
    fn from(err: image::ImageError) -> Self {
        TumorScanError::ImageDecode(err.to_string())
    }
}

/// Convenience Result type for TumorScan operations
pub type Result<T> = std::result::Result<T, TumorScanError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| TumorScanError::Inference(format!("{}: {:?}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| TumorScanError::Inference(format!("{}: {:?}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| TumorScanError::Inference(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| TumorScanError::Inference(f()))
    }
}
