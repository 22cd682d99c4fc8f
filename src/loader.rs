//! Resolves the physical dataset file and opens it lazily.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::clean::clean;
use crate::config::DataPaths;
use crate::convert::{convert, csv_to_parquet_bytes};
use crate::error::Result;
use crate::table::{Frame, LazyTable};

/// Produces deferred tables over a dataset.
///
/// Both methods block on file I/O; async callers run them on the blocking pool.
pub trait TableSource: Send + Sync {
    /// Lazy handle over the columnar cache file, converting on first access.
    fn load(&self) -> Result<LazyTable>;

    /// Cleaned handle over an in-memory copy of the source file.
    fn load_in_memory(&self) -> Result<LazyTable>;

    /// Identifies the dataset behind this source in shared cache keys.
    fn dataset_id(&self) -> String;
}

/// Loads a dataset from a CSV source, keeping a Parquet copy as a cache.
#[derive(Debug, Clone)]
pub struct DataLoader {
    csv_path: PathBuf,
    parquet_path: PathBuf,
}

impl DataLoader {
    pub fn new(csv_path: impl Into<PathBuf>, parquet_path: impl Into<PathBuf>) -> Self {
        Self {
            csv_path: csv_path.into(),
            parquet_path: parquet_path.into(),
        }
    }

    pub fn from_paths(paths: &DataPaths) -> Self {
        Self::new(&paths.csv_file_path, &paths.parquet_file_path)
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    pub fn parquet_path(&self) -> &Path {
        &self.parquet_path
    }
}

impl TableSource for DataLoader {
    #[tracing::instrument(skip(self), fields(parquet = %self.parquet_path.display()))]
    fn load(&self) -> Result<LazyTable> {
        if !self.parquet_path.exists() {
            info!(csv = %self.csv_path.display(), "Parquet cache missing, converting");
            convert(&self.csv_path, &self.parquet_path)?;
        } else {
            debug!("Parquet cache present");
        }
        LazyTable::scan_parquet(&self.parquet_path)
    }

    #[tracing::instrument(skip(self), fields(csv = %self.csv_path.display()))]
    fn load_in_memory(&self) -> Result<LazyTable> {
        let bytes = csv_to_parquet_bytes(&self.csv_path)?;
        let frame = Frame::from_parquet_bytes(bytes)?;
        Ok(clean(LazyTable::from_frame(frame)))
    }

    fn dataset_id(&self) -> String {
        self.parquet_path.display().to_string()
    }
}
