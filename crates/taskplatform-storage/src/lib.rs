//! # taskplatform-storage
//!
//! Storage abstraction layer for taskplatform.
//!
//! This crate defines the traits, task types and errors that storage and cache
//! backends share, plus [`CachedCollectionStore`], the read-through /
//! write-invalidate component that sits between the HTTP layer and them.
//! Backend implementations live in separate crates.
//!
//! ## Overview
//!
//! - [`CollectionStore`]: the store-of-record contract (list, get, insert,
//!   update, delete, ping).
//! - [`CollectionCache`]: the best-effort key-value cache contract, with
//!   [`NoopCache`] as the nil-object.
//! - [`CachedCollectionStore`]: serves `list` from the cache, invalidates it
//!   after every committed write.
//!
//! ## Example
//!
//! ```ignore
//! use taskplatform_storage::{Command, StorageError, TaskCollection, TaskPatch, TaskStatus};
//!
//! async fn complete(tasks: &TaskCollection, id: i64) -> Result<(), StorageError> {
//!     tasks
//!         .mutate(Command::Update(id, TaskPatch::status(TaskStatus::Completed)))
//!         .await?;
//!     Ok(())
//! }
//! ```

mod cached;
mod error;
mod traits;
mod types;

// Re-export everything from submodules
pub use cached::{CachedCollectionStore, DEFAULT_TTL};
pub use error::{CacheError, ErrorCategory, StorageError};
pub use traits::{CollectionCache, CollectionStore, NoopCache};
pub use types::{
    CacheStatus, Command, HealthReport, HealthStatus, MAX_TITLE_LEN, NewTask, StoreStatus, Task,
    TaskCommand, TaskId, TaskPatch, TaskStats, TaskStatus, Validate,
};

/// Cache key of the task collection snapshot.
pub const TASKS_COLLECTION_KEY: &str = "tasks:all";

/// The store-of-record contract specialised to tasks.
pub type TaskStore =
    dyn CollectionStore<Entity = Task, Id = TaskId, Draft = NewTask, Patch = TaskPatch>;

/// Type alias for a shareable task store.
pub type DynTaskStore = std::sync::Arc<TaskStore>;

/// Type alias for a shareable cache.
pub type DynCache = std::sync::Arc<dyn CollectionCache>;

/// The cached task collection used by the HTTP layer.
pub type TaskCollection = CachedCollectionStore<TaskStore>;
