//! Key-value cache backends.
//!
//! Values are serialized strings; the caller owns the encoding. Every backend
//! expires entries natively after the TTL passed to `set`.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use super::{CacheConfig, TypedCache};
use crate::error::CacheError;

/// A simple key-value store with time-based expiry.
///
/// No multi-key atomicity is expected from implementations.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// In-process backend built on [`TypedCache`].
#[derive(Debug, Clone)]
pub struct MokaCacheStore {
    cache: TypedCache<String, String>,
}

impl MokaCacheStore {
    pub fn new(config: CacheConfig) -> Self {
        let cache = TypedCache::new("posts", config);
        info!("In-process cache '{}' initialized", cache.name());
        Self { cache }
    }
}

#[async_trait]
impl CacheStore for MokaCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.cache.get(&key.to_string()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.cache.insert_with_ttl(key.to_string(), value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let key = key.to_string();
        if self.cache.contains(&key) {
            self.cache.invalidate(&key);
            debug!(key = %key, "cache entry removed");
        }
        Ok(())
    }
}

/// Shared backend for multi-instance deployments.
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
}

impl RedisCacheStore {
    /// Connect to Redis and verify the connection.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Successfully connected to Redis");

        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        Ok(conn.get::<_, Option<String>>(key).await?)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        // SETEX rejects a zero expiry.
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_moka_store_roundtrip() {
        let store = MokaCacheStore::new(CacheConfig::default());

        store.set("post:1", "{}".to_string(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("post:1").await.unwrap().as_deref(), Some("{}"));

        store.delete("post:1").await.unwrap();
        assert_eq!(store.get("post:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_moka_store_delete_absent_is_ok() {
        let store = MokaCacheStore::new(CacheConfig::default());
        assert!(store.delete("post:404").await.is_ok());
    }

    #[tokio::test]
    async fn test_moka_store_honours_ttl() {
        let store = MokaCacheStore::new(CacheConfig::default());

        store.set("all_posts", "[]".to_string(), Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(store.get("all_posts").await.unwrap(), None);
    }
}
