//! Cache backends for the collection snapshot: local (DashMap) or Redis.

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskplatform_storage::{CacheError, CacheStatus, CollectionCache};

/// A cached entry with TTL support.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    /// Create a new cached entry.
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            cached_at: Instant::now(),
            ttl,
        }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Cache backend for the collection snapshot.
///
/// ## Cache Modes
///
/// - **Local**: Single-instance mode using a DashMap
/// - **Redis**: Shared across instances; no local tier, so every instance
///   observes an invalidation as soon as the `DEL` completes
#[derive(Clone)]
pub enum CacheBackend {
    /// Single-instance: local DashMap only
    Local(Arc<DashMap<String, CachedEntry>>),

    /// Multi-instance: Redis only
    Redis { redis: Pool },
}

impl CacheBackend {
    /// Create a new local-only cache backend.
    pub fn new_local() -> Self {
        CacheBackend::Local(Arc::new(DashMap::new()))
    }

    /// Create a new Redis-backed cache backend.
    pub fn new_redis(redis_pool: Pool) -> Self {
        CacheBackend::Redis { redis: redis_pool }
    }

    /// Number of live entries held in process. Always 0 in Redis mode.
    pub fn local_entries(&self) -> usize {
        match self {
            CacheBackend::Local(map) => map.len(),
            CacheBackend::Redis { .. } => 0,
        }
    }

    fn mode(&self) -> &'static str {
        match self {
            CacheBackend::Local(_) => "local",
            CacheBackend::Redis { .. } => "redis",
        }
    }

    fn record_lookup(&self, hit: bool) {
        crate::metrics::record_cache_lookup(self.mode(), hit);
    }
}

async fn connection(redis: &Pool) -> Result<deadpool_redis::Connection, CacheError> {
    redis
        .get()
        .await
        .map_err(|e| CacheError::unavailable(format!("Failed to get Redis connection: {e}")))
}

#[async_trait]
impl CollectionCache for CacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let result = match self {
            CacheBackend::Local(map) => {
                let found = map.get(key).map(|entry| entry.value().clone());
                match found {
                    Some(entry) if !entry.is_expired() => Some(entry.data.as_ref().clone()),
                    Some(_) => {
                        // Evict, unless a fresh entry replaced it meanwhile
                        map.remove_if(key, |_, entry| entry.is_expired());
                        None
                    }
                    None => None,
                }
            }
            CacheBackend::Redis { redis } => {
                let mut conn = match connection(redis).await {
                    Ok(conn) => conn,
                    Err(e) => {
                        self.record_lookup(false);
                        return Err(e);
                    }
                };
                match conn.get::<_, Option<Vec<u8>>>(key).await {
                    Ok(data) => data,
                    Err(e) => {
                        self.record_lookup(false);
                        return Err(CacheError::unavailable(format!("Redis GET error: {e}")));
                    }
                }
            }
        };

        self.record_lookup(result.is_some());
        tracing::debug!(key = %key, hit = result.is_some(), mode = self.mode(), "cache lookup");
        Ok(result)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(map) => {
                map.insert(key.to_string(), CachedEntry::new(value, ttl));
            }
            CacheBackend::Redis { redis } => {
                let mut conn = connection(redis).await?;
                // SET EX rejects a zero expiry
                let ttl_secs = ttl.as_secs().max(1);
                conn.set_ex::<_, _, ()>(key, value, ttl_secs)
                    .await
                    .map_err(|e| CacheError::unavailable(format!("Redis SET error: {e}")))?;
                tracing::debug!(key = %key, ttl_secs = %ttl_secs, "cache set (redis)");
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(map) => {
                map.remove(key);
                tracing::debug!(key = %key, "cache invalidated (local)");
            }
            CacheBackend::Redis { redis } => {
                let mut conn = connection(redis).await?;
                conn.del::<_, ()>(key)
                    .await
                    .map_err(|e| CacheError::unavailable(format!("Redis DEL error: {e}")))?;
                tracing::debug!(key = %key, "cache invalidated (redis)");
            }
        }
        crate::metrics::record_cache_invalidation(self.mode());
        Ok(())
    }

    async fn probe(&self) -> CacheStatus {
        match self {
            CacheBackend::Local(_) => CacheStatus::Up,
            CacheBackend::Redis { redis } => {
                let mut conn = match redis.get().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(error = %e, "Redis health probe: no connection");
                        return CacheStatus::Disconnected;
                    }
                };
                let pong: redis::RedisResult<String> =
                    redis::cmd("PING").query_async(&mut conn).await;
                match pong {
                    Ok(_) => CacheStatus::Up,
                    Err(e) => {
                        tracing::warn!(error = %e, "Redis health probe: PING failed");
                        CacheStatus::Down
                    }
                }
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        self.mode()
    }
}
