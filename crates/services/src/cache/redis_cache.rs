use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::info;

use super::{CacheError, CacheResult, KvCache};

/// Redis-backed cache. The connection manager is shared by every component
/// and reconnects on its own; each call is bounded by `op_timeout`.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisCache {
    pub async fn connect(url: &str, op_timeout: Duration) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = tokio::time::timeout(op_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout(format!("connecting to {url}")))??;

        info!("Connected to Redis");
        Ok(Self { conn, op_timeout })
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> CacheResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CacheError::Timeout(op.to_string())),
        }
    }
}

#[async_trait]
impl KvCache for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded("GET", async move { conn.get(key).await }).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        self.bounded("SET", async move { conn.set_ex(key, value, ttl.as_secs()).await })
            .await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = self
            .bounded("SET NX", async move {
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("EX")
                    .arg(ttl.as_secs())
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        self.bounded("DEL", async move { conn.del(key).await }).await
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        self.bounded("SADD", async move {
            redis::pipe()
                .atomic()
                .sadd(key, member)
                .ignore()
                .expire(key, ttl.as_secs() as i64)
                .ignore()
                .query_async(&mut conn)
                .await
        })
        .await
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.conn.clone();
        self.bounded("SMEMBERS", async move { conn.smembers(key).await })
            .await
    }

    async fn sorted_add(&self, key: &str, member: &str, score: f64, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        self.bounded("ZADD", async move {
            redis::pipe()
                .atomic()
                .zadd(key, member, score)
                .ignore()
                .expire(key, ttl.as_secs() as i64)
                .ignore()
                .query_async(&mut conn)
                .await
        })
        .await
    }

    async fn sorted_members_desc(&self, key: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.conn.clone();
        self.bounded("ZREVRANGE", async move { conn.zrevrange(key, 0, -1).await })
            .await
    }
}
