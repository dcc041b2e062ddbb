//! In-memory task storage backend for taskplatform.
//!
//! This crate provides an in-memory implementation of the `CollectionStore`
//! trait from `taskplatform-storage`, using papaya lock-free HashMap for
//! concurrent access. It backs local development (`storage.backend = "memory"`)
//! and the test suites.
//!
//! # Example
//!
//! ```ignore
//! use taskplatform_db_memory::InMemoryStorage;
//! use taskplatform_storage::{CollectionStore, NewTask};
//!
//! let storage = InMemoryStorage::new();
//! let created = storage.insert(&NewTask::new("write docs")).await?;
//! ```

pub mod storage;

pub use storage::InMemoryStorage;

// Re-export the CollectionStore trait for convenience
pub use taskplatform_storage::{CollectionStore, DynTaskStore, StorageError, Task};

/// Creates a new in-memory task store.
pub fn create_task_store() -> DynTaskStore {
    std::sync::Arc::new(InMemoryStorage::new())
}
