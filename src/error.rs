//! Error taxonomy for the extraction pipeline.
//!
//! None of these escape [`crate::Previewer::preview`]; the cascade turns every
//! one of them into a descriptive [`crate::ExtractionResult`].

use std::time::Duration;
use thiserror::Error;

/// Errors raised while extracting content from a document.
#[derive(Error, Debug)]
pub enum PreviewError {
    /// The ZIP container could not be opened at all.
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// An expected part is missing from the container.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// The validator judged the payload to be encrypted.
    #[error("content appears to be encrypted: {0}")]
    LikelyEncrypted(String),

    /// Every strategy of the cascade fell below its threshold.
    #[error("all {attempted} extraction strategies were exhausted")]
    StrategyExhausted { attempted: usize },

    /// A strategy or backend exceeded its time budget.
    #[error("{strategy} exceeded its time budget of {budget:?}")]
    BackendTimeout {
        strategy: &'static str,
        budget: Duration,
    },

    /// A third-party parsing library failed.
    #[error("{backend} failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    /// An XML part could not be scanned.
    #[error("xml error in {part}: {message}")]
    Xml { part: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PreviewError {
    /// Wrap a backend failure, keeping the full `anyhow` context chain.
    pub fn backend(backend: &'static str, err: anyhow::Error) -> Self {
        PreviewError::Backend {
            backend,
            message: format!("{:#}", err),
        }
    }

    /// Whether this failure only reduces what can be shown, rather than
    /// making the current strategy unusable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PreviewError::EntryNotFound(_))
    }
}

impl From<zip::result::ZipError> for PreviewError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::FileNotFound => {
                PreviewError::EntryNotFound("requested entry".to_string())
            }
            other => PreviewError::MalformedContainer(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PreviewError>;
