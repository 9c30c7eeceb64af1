//! Redis-backed shared store.
//!
//! Requires the `redis` feature.

use ::redis::AsyncCommands;
use ::redis::aio::ConnectionManager;
use async_trait::async_trait;
use ghcache_core::{Error, Result, SharedStore};
use std::time::Duration;
use tracing::info;

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379").
    pub url: String,
    /// Prefix prepended to every key.
    pub prefix: String,
    /// Timeout for a single command.
    pub operation_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            prefix: String::new(),
            operation_timeout: Duration::from_secs(2),
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

/// Shared store on a Redis server, reconnecting automatically.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    config: RedisConfig,
}

impl RedisStore {
    /// Connect to Redis.
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        info!(url = %config.url, "Connecting to Redis");
        let client = ::redis::Client::open(config.url.as_str())
            .map_err(|e| Error::StoreUnavailable(format!("Redis client error: {}", e)))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::StoreUnavailable(format!("Redis connection error: {}", e)))?;
        Ok(Self { conn, config })
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.config.prefix, key)
    }

    async fn timed<T>(
        &self,
        op: &str,
        fut: impl std::future::Future<Output = ::redis::RedisResult<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.operation_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::StoreUnavailable(format!("Redis {} error: {}", op, e))),
            Err(_) => Err(Error::StoreUnavailable(format!("Redis {} timed out", op))),
        }
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let key = self.prefixed(key);
        self.timed("GET", conn.get::<_, Option<Vec<u8>>>(&key)).await
    }

    async fn set_with_expire(&self, key: &str, value: &[u8], ttl_minutes: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = self.prefixed(key);
        self.timed("SETEX", conn.set_ex::<_, _, ()>(&key, value, ttl_minutes * 60))
            .await
    }

    async fn expire(&self, key: &str, ttl_minutes: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = self.prefixed(key);
        let seconds = (ttl_minutes * 60) as i64;
        let _updated: bool = self
            .timed("EXPIRE", conn.expire::<_, bool>(&key, seconds))
            .await?;
        Ok(())
    }
}
