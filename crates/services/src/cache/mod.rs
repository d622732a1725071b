//! Key-value cache used as a best-effort accelerator in front of the
//! document store.

pub mod aside;
pub mod keys;
pub mod memory;
pub mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use aside::{CacheAside, CacheWrite};
pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Cache operation timed out: {0}")]
    Timeout(String),
    #[error("Cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// The subset of key-value primitives the pipeline relies on. Every write
/// carries a TTL; nothing in the cache is meant to live forever.
#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Atomic set-if-absent. Returns `true` when this call created the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Adds `member` to the set at `key` and refreshes the set's TTL.
    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> CacheResult<()>;

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>>;

    /// Adds `member` to the sorted set at `key` and refreshes its TTL.
    async fn sorted_add(&self, key: &str, member: &str, score: f64, ttl: Duration) -> CacheResult<()>;

    /// All members, highest score first.
    async fn sorted_members_desc(&self, key: &str) -> CacheResult<Vec<String>>;
}
