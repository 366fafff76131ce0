//! Shared error types for the analysis engine.

use crate::core::addr::CellAddress;
use thiserror::Error;

/// Main error type for analysis operations.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The underlying workbook source failed; the run is aborted.
    #[error("reader error: {message}")]
    Reader {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A formula could not be tokenized. Recovered locally where possible;
    /// surfaced only when recovery is impossible.
    #[error("parse error at {cell}: {message}")]
    Parse { cell: CellAddress, message: String },

    /// Invalid options passed to the orchestrator.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A post-condition check failed; indicates a bug.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    /// The run was cancelled; no partial result is returned.
    #[error("analysis cancelled")]
    Cancelled,

    /// IO errors at the reader/writer boundary.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON errors from the workbook-dump reader.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    pub fn reader(message: impl Into<String>) -> Self {
        Self::Reader {
            message: message.into(),
            source: None,
        }
    }

    pub fn reader_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Reader {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, AnalysisError>;
