//! Typed failures surfaced by the data pipeline.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A source or cache file could not be read or written.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed row-oriented input (ragged rows, missing header, bad encoding).
    #[error("malformed input: {0}")]
    Format(String),

    /// The aggregation plan could not be evaluated against the table.
    #[error("aggregation error: {0}")]
    Aggregation(String),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl DataError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        DataError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether the failure came from the filesystem rather than the data itself.
    pub fn is_io(&self) -> bool {
        matches!(self, DataError::Io { .. })
    }
}

pub type Result<T, E = DataError> = std::result::Result<T, E>;
