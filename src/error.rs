//! Error types for dataset loading and preparation

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    /// An expected split file is absent
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line could not be decoded into a record
    #[error("{}:{line}: {reason}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Declared length {declared} but parsed {actual} records")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Record {field} has {actual} elements, shape expects {expected}")]
    ShapeMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{inputs} input rows but {targets} target rows")]
    RowMismatch { inputs: usize, targets: usize },

    #[error("Value {value} does not fit the element type")]
    Conversion { value: i64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("Bad matrix file {}: {reason}", path.display())]
    Matrix { path: PathBuf, reason: String },
}

impl DatasetError {
    /// Wraps an io error, mapping `NotFound` to its own variant.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            DatasetError::NotFound { path }
        } else {
            DatasetError::Io { path, source }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DatasetError::NotFound { .. })
    }
}
