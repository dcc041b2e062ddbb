//! Integration tests for the collection cache backends.
//!
//! Local-mode tests run everywhere. Redis tests use testcontainers to spin up
//! a real Redis instance and are ignored unless Docker is available:
//! `cargo test -p taskplatform-server --test cache_backend -- --ignored`.

use std::time::Duration;

use taskplatform_server::{
    CacheBackend, CacheBackendKind, CacheConfig, RedisConfig, create_cache, create_redis_backend,
};
use taskplatform_storage::{CacheStatus, CollectionCache};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

/// Get or create the shared Redis container
async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");

            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{}", host_port);

            (container, url)
        })
        .await;

    url.clone()
}

fn redis_config(url: String) -> RedisConfig {
    RedisConfig {
        url,
        pool_size: 5,
        timeout_ms: 500,
    }
}

#[tokio::test]
async fn test_local_cache_get_set() {
    let cache = CacheBackend::new_local();

    cache
        .set("test_key", b"test_value".to_vec(), Duration::from_secs(60))
        .await
        .unwrap();

    let value = cache.get("test_key").await.unwrap();
    assert_eq!(value, Some(b"test_value".to_vec()));
    assert_eq!(cache.local_entries(), 1);
    assert_eq!(cache.get("other_key").await.unwrap(), None);
}

#[tokio::test]
async fn test_local_cache_expiration() {
    let cache = CacheBackend::new_local();

    cache
        .set(
            "expiring_key",
            b"value".to_vec(),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

    assert!(cache.get("expiring_key").await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(150)).await;

    // Expired entries read as misses and are evicted
    assert!(cache.get("expiring_key").await.unwrap().is_none());
    assert_eq!(cache.local_entries(), 0);
}

#[tokio::test]
async fn test_local_cache_delete() {
    let cache = CacheBackend::new_local();

    cache
        .set("key_to_delete", b"value".to_vec(), Duration::from_secs(60))
        .await
        .unwrap();
    assert!(cache.get("key_to_delete").await.unwrap().is_some());

    cache.delete("key_to_delete").await.unwrap();
    assert!(cache.get("key_to_delete").await.unwrap().is_none());

    // Deleting a missing key is fine
    cache.delete("key_to_delete").await.unwrap();
}

#[tokio::test]
async fn test_create_cache_follows_config() {
    let redis = RedisConfig::default();

    let none = CacheConfig {
        backend: CacheBackendKind::None,
        ..Default::default()
    };
    let cache = create_cache(&none, &redis).await;
    assert_eq!(cache.backend_name(), "none");
    assert_eq!(cache.probe().await, CacheStatus::Disconnected);

    let local = CacheConfig::default();
    let cache = create_cache(&local, &redis).await;
    assert_eq!(cache.backend_name(), "local");
    assert_eq!(cache.probe().await, CacheStatus::Up);
}

#[tokio::test]
async fn test_unreachable_redis_is_still_installed() {
    // Nothing listens on port 1
    let cache = create_redis_backend(&redis_config("redis://127.0.0.1:1".into()))
        .await
        .expect("pool config is valid");

    assert_eq!(cache.backend_name(), "redis");
    assert_eq!(cache.probe().await, CacheStatus::Disconnected);

    let err = cache.get("tasks:all").await.unwrap_err();
    assert!(err.to_string().contains("Redis"));
    assert!(
        cache
            .set("tasks:all", b"[]".to_vec(), Duration::from_secs(60))
            .await
            .is_err()
    );
    assert!(cache.delete("tasks:all").await.is_err());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_cache_round_trip() {
    let redis_url = get_redis_url().await;
    let cache = create_redis_backend(&redis_config(redis_url))
        .await
        .expect("redis backend");

    assert_eq!(cache.probe().await, CacheStatus::Up);

    cache
        .set("round_trip", b"[1,2,3]".to_vec(), Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(
        cache.get("round_trip").await.unwrap(),
        Some(b"[1,2,3]".to_vec())
    );

    cache.delete("round_trip").await.unwrap();
    assert_eq!(cache.get("round_trip").await.unwrap(), None);
    assert_eq!(cache.local_entries(), 0);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_cache_expiration() {
    let redis_url = get_redis_url().await;
    let cache = create_redis_backend(&redis_config(redis_url))
        .await
        .expect("redis backend");

    // Sub-second TTLs round up to one second
    cache
        .set("short_lived", b"value".to_vec(), Duration::from_millis(10))
        .await
        .unwrap();
    assert!(cache.get("short_lived").await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(cache.get("short_lived").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_instances_share_invalidation() {
    let redis_url = get_redis_url().await;
    let a = create_redis_backend(&redis_config(redis_url.clone()))
        .await
        .expect("redis backend");
    let b = create_redis_backend(&redis_config(redis_url))
        .await
        .expect("redis backend");

    a.set("shared", b"value".to_vec(), Duration::from_secs(60))
        .await
        .unwrap();
    assert!(b.get("shared").await.unwrap().is_some());

    b.delete("shared").await.unwrap();
    assert!(a.get("shared").await.unwrap().is_none());
}
