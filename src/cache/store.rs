//! External key-value store for realized results.
//!
//! [`KvStore`] is the async seam; [`RedisStore`] talks to Redis. The store is
//! a performance aid only: [`connect_or_disable`] turns an unreachable
//! backend into "no store" instead of a startup failure.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

/// Byte-valued store with per-key expiry.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
}

/// Redis-backed [`KvStore`]. Keys are namespaced as `{prefix}:{key}`.
///
/// Every command gives up after [`COMMAND_TIMEOUT`], so a server that stops
/// answering surfaces as an error instead of a hang.
pub struct RedisStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisStore {
    /// Opens a managed connection to `url`, failing if the server cannot be
    /// reached within a few seconds.
    pub async fn connect(url: &str, prefix: &str) -> Result<Self> {
        let client = redis::Client::open(url).with_context(|| format!("invalid Redis URL '{url}'"))?;
        let conn = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .with_context(|| format!("timed out connecting to Redis at '{url}'"))?
            .with_context(|| format!("failed to connect to Redis at '{url}'"))?;

        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait::async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let key = self.namespaced(key);
        let value: Option<Vec<u8>> = tokio::time::timeout(COMMAND_TIMEOUT, conn.get(key.as_str()))
            .await
            .with_context(|| format!("Redis GET timed out for '{key}'"))?
            .with_context(|| format!("Redis GET failed for '{key}'"))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = self.namespaced(key);
        let write = conn.set_ex(key.as_str(), value, ttl.as_secs().max(1));
        let _: () = tokio::time::timeout(COMMAND_TIMEOUT, write)
            .await
            .with_context(|| format!("Redis SETEX timed out for '{key}'"))?
            .with_context(|| format!("Redis SETEX failed for '{key}'"))?;
        Ok(())
    }
}

/// Connects to the configured store, or returns `None` when no URL is set
/// or the backend is unreachable.
pub async fn connect_or_disable(url: Option<&str>, prefix: &str) -> Option<Arc<dyn KvStore>> {
    let url = url?;
    match RedisStore::connect(url, prefix).await {
        Ok(store) => {
            info!(url, prefix, "Result store connected");
            Some(Arc::new(store))
        }
        Err(e) => {
            warn!(url, error = %format!("{e:#}"), "Result store unreachable, caching of results disabled");
            None
        }
    }
}
