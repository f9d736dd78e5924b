//! Error types for the model builder

use thiserror::Error;

/// Result type alias for model builder operations
pub type Result<T> = std::result::Result<T, BuilderError>;

/// Main error type for the model builder
#[derive(Error, Debug)]
pub enum BuilderError {
    /// Data-quality failure raised while preparing a dataset
    #[error("{0}")]
    Validation(String),

    /// Client supplied something unusable (bad column, unseen category, ...)
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("No algorithms could be trained")]
    NoAlgorithmsTrained,

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Computation error: {0}")]
    Computation(String),

    #[error("Unsupported artifact schema version {found} (newest supported is {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BuilderError {
    /// Whether the error was caused by the request rather than the service.
    /// Polars and schema failures count as internal; upload parsing maps its
    /// own errors to a bad request.
    pub fn is_client_error(&self) -> bool {
        matches!(self, BuilderError::Validation(_) | BuilderError::InvalidInput(_))
    }
}

impl From<polars::error::PolarsError> for BuilderError {
    fn from(err: polars::error::PolarsError) -> Self {
        BuilderError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for BuilderError {
    fn from(err: serde_json::Error) -> Self {
        BuilderError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for BuilderError {
    fn from(err: ndarray::ShapeError) -> Self {
        BuilderError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
