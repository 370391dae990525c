//! Error types for the Kolosal IDS pipeline

use thiserror::Error;

/// Result type alias for IDS pipeline operations
pub type Result<T> = std::result::Result<T, IdsError>;

/// Main error type for the IDS pipeline
#[derive(Error, Debug)]
pub enum IdsError {
    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    #[error("Evaluation set must contain both positive and negative examples")]
    NoPositiveOrNegativeExamples,

    #[error("Invalid configuration: {name} = {value}, {reason}")]
    InvalidConfiguration {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl IdsError {
    /// Shorthand for an out-of-range configuration value
    pub fn invalid_config(name: &str, value: impl ToString, reason: &str) -> Self {
        IdsError::InvalidConfiguration {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<polars::error::PolarsError> for IdsError {
    fn from(err: polars::error::PolarsError) -> Self {
        IdsError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for IdsError {
    fn from(err: serde_json::Error) -> Self {
        IdsError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for IdsError {
    fn from(err: ndarray::ShapeError) -> Self {
        IdsError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
