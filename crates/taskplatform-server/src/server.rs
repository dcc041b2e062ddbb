use std::{net::SocketAddr, sync::Arc, time::Instant};

use axum::{Router, middleware, routing::get};
use taskplatform_db_postgres::{DynPostgresStorage, create_storage};
use taskplatform_storage::{DynCache, DynTaskStore, TaskCollection};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{
    cache,
    config::{AppConfig, StorageBackend},
    handlers, middleware as app_middleware,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub tasks: Arc<TaskCollection>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the cached task collection from a store-of-record and a cache.
    pub fn new(store: DynTaskStore, cache: DynCache, cfg: &AppConfig) -> Self {
        let tasks = TaskCollection::new(store, cache, cfg.cache.collection_key.clone())
            .with_ttl(cfg.cache_ttl());
        Self {
            tasks: Arc::new(tasks),
            started_at: Instant::now(),
        }
    }
}

pub struct TaskplatformServer {
    addr: SocketAddr,
    app: Router,
    postgres: Option<DynPostgresStorage>,
}

pub fn build_app(state: AppState, cfg: &AppConfig) -> Router {
    crate::metrics::init_metrics();

    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/api/health", get(handlers::health))
        .route("/api/metrics", get(handlers::metrics))
        .route("/api/stats", get(handlers::stats))
        // Task collection
        .route(
            "/api/tasks",
            get(handlers::list_tasks).post(handlers::create_task),
        )
        .route(
            "/api/tasks/{id}",
            get(handlers::get_task)
                .put(handlers::update_task)
                .delete(handlers::delete_task),
        )
        .route_layer(middleware::from_fn(app_middleware::http_metrics))
        .with_state(state)
        // Layers wrap outward: request id is outermost so the trace span can read it
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = tracing::field::Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(app_middleware::request_id))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Connect the configured store-of-record and cache, then assemble the router.
    pub async fn build(self) -> anyhow::Result<TaskplatformServer> {
        let (store, postgres): (DynTaskStore, Option<DynPostgresStorage>) =
            match self.config.storage.backend {
                StorageBackend::Memory => {
                    tracing::warn!("Using in-memory task storage; data is lost on restart");
                    (taskplatform_db_memory::create_task_store(), None)
                }
                StorageBackend::Postgres => {
                    let pg = create_storage(self.config.storage.postgres.to_pool_config()).await?;
                    (pg.clone() as DynTaskStore, Some(pg))
                }
            };

        let cache = cache::create_cache(&self.config.cache, &self.config.redis).await;
        tracing::info!(
            store = store.backend_name(),
            cache = cache.backend_name(),
            collection_key = %self.config.cache.collection_key,
            ttl_secs = self.config.cache.ttl_secs,
            "Task collection ready"
        );

        let state = AppState::new(store, cache, &self.config);
        let app = build_app(state, &self.config);

        Ok(TaskplatformServer {
            addr: self.addr,
            app,
            postgres,
        })
    }
}

impl TaskplatformServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        if let Some(pg) = self.postgres {
            pg.close().await;
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use taskplatform_storage::NoopCache;
    use tower::ServiceExt;

    fn app() -> Router {
        let cfg = AppConfig::default();
        let state = AppState::new(
            taskplatform_db_memory::create_task_store(),
            Arc::new(NoopCache),
            &cfg,
        );
        build_app(state, &cfg)
    }

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        let res = app()
            .oneshot(
                Request::get("/")
                    .header("x-request-id", "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-request-id"], "req-42");
    }

    #[tokio::test]
    async fn test_request_id_is_generated() {
        let res = app()
            .oneshot(Request::get("/api/tasks").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let id = res.headers()["x-request-id"].to_str().unwrap();
        assert_eq!(id.len(), 36);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_trace_span_carries_request_id() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let res = app()
            .oneshot(
                Request::get("/api/tasks")
                    .header("x-request-id", "req-7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let line = output
            .lines()
            .find(|line| line.contains("request handled"))
            .expect("response is logged");
        assert!(line.contains("request_id=req-7"), "{line}");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let res = app()
            .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
