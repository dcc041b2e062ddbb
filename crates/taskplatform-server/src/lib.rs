pub mod cache;
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod server;

pub use cache::{CacheBackend, CachedEntry, create_cache, create_redis_backend};
pub use config::{
    AppConfig, CacheBackendKind, CacheConfig, LoggingConfig, PostgresStorageConfig, RedisConfig,
    ServerConfig, StorageBackend, StorageConfig,
};
pub use handlers::ApiError;
pub use observability::init_tracing;
pub use server::{AppState, ServerBuilder, TaskplatformServer, build_app};
