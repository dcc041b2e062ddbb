//! PostgreSQL implementation of the CollectionStore trait.

use async_trait::async_trait;
use sqlx_postgres::PgPool;
use tracing::info;

use taskplatform_storage::{CollectionStore, NewTask, StorageError, Task, TaskId, TaskPatch};

use crate::config::PostgresConfig;
use crate::migrations;
use crate::pool;
use crate::queries::crud;

/// PostgreSQL storage backend for tasks.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Creates a new `PostgresStorage` with the given configuration.
    ///
    /// This will:
    /// 1. Create a connection pool
    /// 2. Run migrations (if configured)
    ///
    /// # Errors
    ///
    /// Returns an error if the connection pool cannot be created
    /// or if migrations fail.
    pub async fn new(config: PostgresConfig) -> Result<Self, StorageError> {
        let pool = pool::create_pool(&config).await?;

        if config.run_migrations {
            migrations::run(&pool).await?;
        }

        Ok(Self { pool })
    }

    /// Creates a new `PostgresStorage` from an existing connection pool.
    ///
    /// Migrations are not run automatically when using this constructor.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes every pooled connection, waiting for checked-out ones to return.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL connection pool closed");
    }
}

#[async_trait]
impl CollectionStore for PostgresStorage {
    type Entity = Task;
    type Id = TaskId;
    type Draft = NewTask;
    type Patch = TaskPatch;

    async fn list(&self) -> Result<Vec<Task>, StorageError> {
        crud::list(&self.pool).await
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StorageError> {
        crud::read(&self.pool, id).await
    }

    async fn insert(&self, draft: &NewTask) -> Result<Task, StorageError> {
        crud::create(&self.pool, draft).await
    }

    async fn update(&self, id: TaskId, patch: &TaskPatch) -> Result<Option<Task>, StorageError> {
        crud::update(&self.pool, id, patch).await
    }

    async fn delete(&self, id: TaskId) -> Result<Option<Task>, StorageError> {
        crud::delete(&self.pool, id).await
    }

    async fn ping(&self) -> Result<(), StorageError> {
        crud::ping(&self.pool).await
    }

    fn entity_name(&self) -> &'static str {
        "Task"
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
