//! Error types for the indexing engine

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while building datasets or applying interactions.
///
/// Degenerate data (empty selections, zero-width intervals) is never an error;
/// those cases produce neutral values instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A record lacks an attribute the dataset needs, or carries the wrong type
    #[error("schema mismatch in {dataset} dataset: record {record} has no usable '{attribute}'")]
    Schema {
        dataset: String,
        record: i64,
        attribute: String,
    },

    /// An argument outside the accepted domain (sort criterion, bin count, ...)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No dimension registered under this name
    #[error("unknown dimension '{0}'")]
    UnknownDimension(String),

    /// No group registered under this name
    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    /// No widget registered under this name
    #[error("unknown widget '{0}'")]
    UnknownWidget(String),

    /// Interaction script could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// JSON decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error while reading a data source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn schema(dataset: &str, record: i64, attribute: &str) -> Self {
        EngineError::Schema {
            dataset: dataset.to_string(),
            record,
            attribute: attribute.to_string(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidArgument(msg.into())
    }
}
