//! Caching for the task collection snapshot.
//!
//! ## Modes
//!
//! - **none**: [`NoopCache`], every list reads the store-of-record
//! - **local**: in-process DashMap, per instance
//! - **redis**: shared across instances
//!
//! ## Graceful Degradation
//!
//! A Redis backend is installed even when Redis is unreachable at startup.
//! Each failing call degrades to a cache miss and the backend recovers as
//! soon as Redis comes back.

pub mod backend;

pub use backend::{CacheBackend, CachedEntry};

use std::sync::Arc;
use std::time::Duration;

use taskplatform_storage::{DynCache, NoopCache};

use crate::config::{CacheBackendKind, CacheConfig, RedisConfig};

/// Create the collection cache described by the configuration.
pub async fn create_cache(cache: &CacheConfig, redis: &RedisConfig) -> DynCache {
    match cache.backend {
        CacheBackendKind::None => {
            tracing::info!("Collection cache disabled");
            Arc::new(NoopCache)
        }
        CacheBackendKind::Local => {
            tracing::info!("Using local collection cache");
            Arc::new(CacheBackend::new_local())
        }
        CacheBackendKind::Redis => match create_redis_backend(redis).await {
            Some(backend) => Arc::new(backend),
            None => Arc::new(NoopCache),
        },
    }
}

/// Build the Redis backend. Returns `None` only when the pool configuration
/// itself is invalid; an unreachable server still yields a backend.
pub async fn create_redis_backend(config: &RedisConfig) -> Option<CacheBackend> {
    tracing::info!(url = %config.url, "Connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let timeout = Some(Duration::from_millis(config.timeout_ms));
    let mut pool_config = redis_config.pool.unwrap_or_default();
    pool_config.max_size = config.pool_size;
    pool_config.timeouts.wait = timeout;
    pool_config.timeouts.create = timeout;
    pool_config.timeouts.recycle = timeout;
    redis_config.pool = Some(pool_config);

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(
                error = %e,
                "Invalid Redis pool configuration. Collection cache disabled."
            );
            return None;
        }
    };

    match pool.get().await {
        Ok(_) => tracing::info!("Connected to Redis"),
        Err(e) => tracing::warn!(
            error = %e,
            "Redis unreachable at startup; lists read the store until it recovers"
        ),
    }

    Some(CacheBackend::new_redis(pool))
}
