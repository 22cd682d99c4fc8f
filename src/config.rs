//! Process configuration read from the environment.
//!
//! Paths are resolved once here; the loader only ever sees absolute,
//! already-joined paths.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DataError, Result};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);
/// Longest wait for one result store read or write before it counts as a miss.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_CACHE_PREFIX: &str = "class-stats-cache";
pub const DEFAULT_LABEL_COLUMN: &str = "class";
pub const DEFAULT_SERVICE_NAME: &str = "data-service";

/// Location of the row-oriented source and its columnar cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub csv_file_path: PathBuf,
    pub parquet_file_path: PathBuf,
}

impl DataPaths {
    /// Joins both relative paths onto `base_dir`. Absolute paths are kept.
    pub fn resolve(base_dir: &Path, csv: &str, parquet: &str) -> Self {
        Self {
            csv_file_path: base_dir.join(csv),
            parquet_file_path: base_dir.join(parquet),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data: DataPaths,
    /// Redis URL of the result store. `None` disables it.
    pub cache_url: Option<String>,
    pub cache_ttl: Duration,
    pub cache_prefix: String,
    pub label_column: String,
    /// Owner identity used in cache keys.
    pub service_name: String,
    /// Accepted bearer keys. Empty means the data routes are open.
    pub api_keys: Vec<String>,
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| DataError::Configuration(format!("{key} must be set")))
        };

        let base_dir = match get("DATA_BASE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir()
                .map_err(|e| DataError::Configuration(format!("cannot resolve base dir: {e}")))?,
        };

        let data = DataPaths::resolve(
            &base_dir,
            &required("csv_file_path")?,
            &required("parquet_file_path")?,
        );

        let cache_ttl = match get("CACHE_TTL_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    DataError::Configuration(format!("CACHE_TTL_SECS must be an integer, got '{raw}'"))
                })?;
                Duration::from_secs(secs)
            }
            None => DEFAULT_CACHE_TTL,
        };

        let api_keys = get("API_KEYS")
            .map(|raw| {
                raw.split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            data,
            cache_url: get("CACHE_URL"),
            cache_ttl,
            cache_prefix: get("CACHE_PREFIX").unwrap_or_else(|| DEFAULT_CACHE_PREFIX.to_string()),
            label_column: get("LABEL_COLUMN").unwrap_or_else(|| DEFAULT_LABEL_COLUMN.to_string()),
            service_name: get("SERVICE_NAME").unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            api_keys,
        })
    }
}
