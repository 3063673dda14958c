//! Error types for dataset loading

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading, cleaning or iterating a dataset.
#[derive(Debug, Error)]
pub enum SpectreError {
    /// A file or directory could not be accessed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A frame file is not a readable `.npy` array.
    #[error("cannot read npy frame {path}: {details}")]
    Npy { path: PathBuf, details: String },

    /// A spectrum file is not readable CSV.
    #[error("cannot read spectrum {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A spectrum file lacks a required column.
    #[error("{path} is missing column '{column}'")]
    MissingColumn { path: PathBuf, column: String },

    /// File contents are readable but not usable.
    #[error("invalid data in {path}: {details}")]
    InvalidFormat { path: PathBuf, details: String },

    /// Two arrays that must combine element-wise differ in shape.
    #[error("shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// The cache file exists but could not be decoded or encoded.
    #[error("dataset cache {path} is unusable: {source}")]
    CacheFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The cache directory could not be created.
    #[error("cannot create cache directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SpectreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SpectreError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_format(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        SpectreError::InvalidFormat {
            path: path.into(),
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SpectreError>;
