//! Storage traits for the collection abstraction layer.
//!
//! [`CollectionStore`] is the store-of-record contract and [`CollectionCache`]
//! the best-effort key-value cache contract. Both are object safe so that
//! backends can be chosen at runtime and swapped for in-memory fakes in tests.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{CacheError, StorageError};
use crate::types::{CacheStatus, Validate};

/// The store-of-record for one entity collection.
///
/// Implementations must be thread-safe (`Send + Sync`) and must apply every
/// write as a single atomic statement. They own entity identity and
/// timestamps.
///
/// # Example
///
/// ```ignore
/// use taskplatform_storage::{CollectionStore, StorageError, Task};
///
/// async fn require(store: &DynTaskStore, id: i64) -> Result<Task, StorageError> {
///     store
///         .get(id)
///         .await?
///         .ok_or_else(|| StorageError::not_found("Task", id))
/// }
/// ```
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// The stored record.
    type Entity: Serialize + DeserializeOwned + Clone + Send + Sync;
    /// Identifier assigned by the store on creation.
    type Id: fmt::Display + Copy + Send + Sync;
    /// Fields for a create command.
    type Draft: Validate + Send + Sync;
    /// Partial fields for an update command.
    type Patch: Validate + Send + Sync;

    /// Returns the whole collection ordered newest-first by creation time,
    /// ties broken by descending id.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues.
    async fn list(&self) -> Result<Vec<Self::Entity>, StorageError>;

    /// Reads one entity. Returns `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing entities.
    async fn get(&self, id: Self::Id) -> Result<Option<Self::Entity>, StorageError>;

    /// Inserts a new entity and returns it with its assigned id and timestamps.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Validation` if the draft is rejected by the store.
    async fn insert(&self, draft: &Self::Draft) -> Result<Self::Entity, StorageError>;

    /// Applies the provided fields and refreshes the update timestamp.
    /// Returns `None` if no entity has this id.
    async fn update(
        &self,
        id: Self::Id,
        patch: &Self::Patch,
    ) -> Result<Option<Self::Entity>, StorageError>;

    /// Removes an entity and returns it. Returns `None` if no entity has this id.
    async fn delete(&self, id: Self::Id) -> Result<Option<Self::Entity>, StorageError>;

    /// Trivial liveness probe.
    async fn ping(&self) -> Result<(), StorageError>;

    /// Name of the stored entity used in error messages, e.g. "Task".
    fn entity_name(&self) -> &'static str;

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

/// A best-effort key-value cache with per-entry expiry.
///
/// Every error is advisory: callers fall back to the store-of-record.
#[async_trait]
pub trait CollectionCache: Send + Sync {
    /// Returns the live (unexpired) value for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Replaces the value for `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Deletes `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Trivial liveness probe. Never fails; reports the outcome instead.
    async fn probe(&self) -> CacheStatus;

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

/// Nil-object cache: every lookup misses and every write is dropped.
///
/// Installing it leaves all collection results unchanged; only store-of-record
/// load differs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl CollectionCache for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn probe(&self) -> CacheStatus {
        CacheStatus::Disconnected
    }

    fn backend_name(&self) -> &'static str {
        "none"
    }
}
