//! The data pipeline as one service: load (cached) → clean → aggregate.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::analyzers::aggregate::{aggregate, feature_columns};
use crate::analyzers::types::{AggregationResult, Statistic};
use crate::cache::{CacheKey, KvStore, ResultCache};
use crate::clean::clean;
use crate::config::{AppConfig, DEFAULT_CACHE_TTL, DEFAULT_LABEL_COLUMN, DEFAULT_STORE_TIMEOUT};
use crate::convert::convert;
use crate::error::{DataError, Result};
use crate::loader::{DataLoader, TableSource};
use crate::table::LazyTable;

/// Serves per-class statistics for one dataset.
///
/// Lazy handles are memoized in a [`ResultCache`] that may be shared between
/// instances; entries are keyed by this instance's `owner` identity.
/// Realized aggregation results go to the optional external [`KvStore`],
/// keyed by owner and dataset. Store calls are bounded by `store_timeout`.
pub struct DataService {
    owner: String,
    source: Arc<dyn TableSource>,
    label_column: String,
    tables: Arc<ResultCache<LazyTable>>,
    store: Option<Arc<dyn KvStore>>,
    store_ttl: Duration,
    store_timeout: Duration,
}

impl DataService {
    pub fn new(
        owner: impl Into<String>,
        source: Arc<dyn TableSource>,
        tables: Arc<ResultCache<LazyTable>>,
    ) -> Self {
        Self {
            owner: owner.into(),
            source,
            label_column: DEFAULT_LABEL_COLUMN.to_string(),
            tables,
            store: None,
            store_ttl: DEFAULT_CACHE_TTL,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Builds the service described by `config`, with its own table cache.
    pub fn from_config(config: &AppConfig, store: Option<Arc<dyn KvStore>>) -> Self {
        let source = Arc::new(DataLoader::from_paths(&config.data));
        let tables = Arc::new(ResultCache::new(config.cache_ttl));
        let service = Self::new(&config.service_name, source, tables)
            .with_label_column(&config.label_column);
        match store {
            Some(store) => service.with_store(store, config.cache_ttl),
            None => service,
        }
    }

    pub fn with_label_column(mut self, label: impl Into<String>) -> Self {
        self.label_column = label.into();
        self
    }

    pub fn with_store(mut self, store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        self.store = Some(store);
        self.store_ttl = ttl;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn label_column(&self) -> &str {
        &self.label_column
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Writes `source` (CSV) as Parquet at `target`.
    pub fn convert_csv_to_parquet(source: &std::path::Path, target: &std::path::Path) -> Result<()> {
        convert(source, target)
    }

    pub fn clean_data(&self, table: LazyTable) -> LazyTable {
        clean(table)
    }

    /// Lazy handle over the Parquet cache file, memoized for the cache TTL.
    #[tracing::instrument(skip(self), fields(owner = %self.owner))]
    pub async fn get_data_from_file(&self) -> Result<LazyTable> {
        let key = CacheKey::new(&self.owner, "get_data_from_file");
        let source = self.source.clone();
        self.tables
            .get_or_try_load(&key, || async move {
                let table = tokio::task::spawn_blocking(move || source.load()).await??;
                Ok::<_, DataError>(table)
            })
            .await
    }

    /// Cleaned handle over an in-memory copy of the CSV, memoized for the cache TTL.
    #[tracing::instrument(skip(self), fields(owner = %self.owner))]
    pub async fn get_data_from_memory(&self) -> Result<LazyTable> {
        let key = CacheKey::new(&self.owner, "get_data_from_memory");
        let source = self.source.clone();
        self.tables
            .get_or_try_load(&key, || async move {
                let table = tokio::task::spawn_blocking(move || source.load_in_memory()).await??;
                Ok::<_, DataError>(table)
            })
            .await
    }

    pub async fn mean_data(&self) -> Result<AggregationResult> {
        self.aggregated(Statistic::Mean).await
    }

    pub async fn std_data(&self) -> Result<AggregationResult> {
        self.aggregated(Statistic::Std).await
    }

    /// Per-class `statistic` of every feature, read through the Parquet cache.
    #[tracing::instrument(skip(self), fields(owner = %self.owner))]
    pub async fn aggregated(&self, statistic: Statistic) -> Result<AggregationResult> {
        let key = self.store_key(statistic);
        if let Some(result) = self.fetch_stored(&key).await {
            return Ok(result);
        }

        let table = self.get_data_from_file().await?;
        let result = self.compute(table, statistic).await?;

        self.put_stored(&key, &result).await;
        Ok(result)
    }

    /// Same as [`DataService::aggregated`] but over the in-memory load path.
    #[tracing::instrument(skip(self), fields(owner = %self.owner))]
    pub async fn aggregated_in_memory(&self, statistic: Statistic) -> Result<AggregationResult> {
        let table = self.get_data_from_memory().await?;
        self.compute(table, statistic).await
    }

    async fn compute(&self, table: LazyTable, statistic: Statistic) -> Result<AggregationResult> {
        let table = self.clean_data(table);
        let features = feature_columns(&table.columns(), &self.label_column);
        let label = self.label_column.clone();

        tokio::task::spawn_blocking(move || aggregate(table, &label, &features, statistic)).await?
    }

    /// Result store key: `{owner}:{statistic}_data@{dataset}`.
    fn store_key(&self, statistic: Statistic) -> CacheKey {
        CacheKey::new(
            &self.owner,
            format!("{statistic}_data@{}", self.source.dataset_id()),
        )
    }

    async fn fetch_stored(&self, key: &CacheKey) -> Option<AggregationResult> {
        let store = self.store.as_ref()?;
        let read = match tokio::time::timeout(self.store_timeout, store.get(&key.to_string())).await {
            Ok(read) => read,
            Err(_) => {
                warn!(%key, timeout = ?self.store_timeout, "Result store read timed out, treating as miss");
                return None;
            }
        };
        match read {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(result) => {
                    debug!(%key, "Result store hit");
                    Some(result)
                }
                Err(e) => {
                    warn!(%key, error = %e, "Discarding undecodable stored result");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(%key, error = %format!("{e:#}"), "Result store read failed, treating as miss");
                None
            }
        }
    }

    async fn put_stored(&self, key: &CacheKey, result: &AggregationResult) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let bytes = match serde_json::to_vec(result) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%key, error = %e, "Could not encode result for the store");
                return;
            }
        };
        let key_str = key.to_string();
        let write = store.set(&key_str, bytes, self.store_ttl);
        match tokio::time::timeout(self.store_timeout, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(%key, error = %format!("{e:#}"), "Result store write failed"),
            Err(_) => warn!(%key, timeout = ?self.store_timeout, "Result store write timed out"),
        }
    }
}
