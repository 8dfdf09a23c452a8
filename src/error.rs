//! Error types for dataset operations

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for dataset, layer and export operations
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("{operation} failed for {}: {source}", .path.display())]
    Filesystem {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed manifest {}: {message}", .path.display())]
    ManifestParse { path: PathBuf, message: String },

    #[error("No dataset found at {} (manifest is missing)", .0.display())]
    DatasetNotFound(PathBuf),

    #[error("Cannot create dataset at {}: a file already exists at this path", .0.display())]
    NotADirectory(PathBuf),

    #[error("Cannot create dataset at {}: the directory is not empty", .0.display())]
    NonEmptyDirectory(PathBuf),

    #[error("There is already a layer called '{0}'")]
    DuplicateLayer(String),

    #[error("The layer '{0}' is not a layer of this dataset")]
    UnknownLayer(String),

    #[error("The layer '{layer}' already has mag {mag}")]
    DuplicateMag { layer: String, mag: String },

    #[error("The layer '{layer}' has no mag {mag}")]
    UnknownMag { layer: String, mag: String },

    #[error("Specifying both 'dtype_per_layer' and 'dtype_per_channel' is not allowed")]
    AmbiguousDtype,

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Configuration mismatch: {0}")]
    ConfigMismatch(String),

    #[error("The provided pattern '{pattern}' is invalid: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid axis '{0}': the axis needs to be x, y or z")]
    InvalidAxis(String),

    #[error("Invalid mag: {0}")]
    InvalidMag(String),

    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("Invalid scale: {0}")]
    InvalidScale(String),

    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Image encoding error: {0}")]
    Encode(String),

    #[error("Image decoding error: {0}")]
    Decode(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Executor error: {0}")]
    Executor(String),
}

/// Specialized Result type for dataset operations
pub type Result<T> = std::result::Result<T, DatasetError>;

impl DatasetError {
    /// Wrap an I/O error with the failed operation and its target path
    pub fn filesystem(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        DatasetError::Filesystem {
            operation,
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for DatasetError {
    fn from(err: serde_json::Error) -> Self {
        DatasetError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for DatasetError {
    fn from(err: ndarray::ShapeError) -> Self {
        DatasetError::InvalidDimensions(err.to_string())
    }
}
