//! CachedCollectionStore - read-through / write-invalidate access to a collection.
//!
//! Reads of the whole collection go through a single cache entry keyed by the
//! collection key. Every successful write deletes that entry **after** the
//! store-of-record has committed, so a reader that starts after `mutate`
//! returns never sees a snapshot older than the write.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use taskplatform_storage::{CachedCollectionStore, Command, NewTask, NoopCache};
//!
//! let tasks = CachedCollectionStore::new(store, Arc::new(NoopCache), "tasks:all");
//! let created = tasks.mutate(Command::Create(NewTask::new("write docs"))).await?;
//! assert_eq!(tasks.list().await?[0].id, created.id);
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::StorageError;
use crate::traits::{CollectionCache, CollectionStore};
use crate::types::{Command, HealthReport, StoreStatus, Validate};

/// Default lifetime of a cached collection snapshot.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Cache-aside wrapper around a store-of-record.
///
/// Holds no mutable state of its own; concurrent calls share the store and
/// cache handles.
pub struct CachedCollectionStore<S: CollectionStore + ?Sized> {
    store: Arc<S>,
    cache: Arc<dyn CollectionCache>,
    key: String,
    ttl: Duration,
}

impl<S: CollectionStore + ?Sized> Clone for CachedCollectionStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            key: self.key.clone(),
            ttl: self.ttl,
        }
    }
}

impl<S: CollectionStore + ?Sized> CachedCollectionStore<S> {
    /// Create a store over `store`, caching the collection under `key`.
    pub fn new(store: Arc<S>, cache: Arc<dyn CollectionCache>, key: impl Into<String>) -> Self {
        Self {
            store,
            cache,
            key: key.into(),
            ttl: DEFAULT_TTL,
        }
    }

    /// Set the lifetime of cached snapshots.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a reference to the store-of-record.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Get a reference to the cache.
    pub fn cache(&self) -> &Arc<dyn CollectionCache> {
        &self.cache
    }

    /// Returns the whole collection, newest first.
    ///
    /// Served from the cache when a live snapshot exists; otherwise read from
    /// the store-of-record and written back to the cache on a best-effort basis.
    ///
    /// # Errors
    ///
    /// Fails only when the store-of-record fails. Cache failures degrade to a
    /// store read.
    pub async fn list(&self) -> Result<Vec<S::Entity>, StorageError> {
        if let Some(entities) = self.cached_snapshot().await {
            return Ok(entities);
        }

        let entities = self.store.list().await?;
        self.populate(&entities).await;
        Ok(entities)
    }

    /// Reads one entity straight from the store-of-record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no entity has this id.
    pub async fn get(&self, id: S::Id) -> Result<S::Entity, StorageError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| StorageError::not_found(self.store.entity_name(), id))
    }

    /// Applies a command to the store-of-record, then invalidates the cached
    /// snapshot.
    ///
    /// Input is validated before the store is touched, so a rejected command
    /// neither writes nor invalidates. `Delete` returns the removed entity.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Validation` for rejected input,
    /// `StorageError::NotFound` for an unknown id on update/delete, and the
    /// store-of-record's own error otherwise.
    pub async fn mutate(
        &self,
        command: Command<S::Id, S::Draft, S::Patch>,
    ) -> Result<S::Entity, StorageError> {
        let kind = command.kind();
        let entity = match command {
            Command::Create(draft) => {
                draft.validate()?;
                self.store.insert(&draft).await?
            }
            Command::Update(id, patch) => {
                patch.validate()?;
                self.store
                    .update(id, &patch)
                    .await?
                    .ok_or_else(|| StorageError::not_found(self.store.entity_name(), id))?
            }
            Command::Delete(id) => self
                .store
                .delete(id)
                .await?
                .ok_or_else(|| StorageError::not_found(self.store.entity_name(), id))?,
        };

        // Only after the commit: a concurrent reader must not repopulate the
        // entry with pre-commit data after we delete it.
        self.invalidate().await;
        debug!(key = %self.key, command = kind, "collection mutated");

        Ok(entity)
    }

    /// Probes the store-of-record and the cache concurrently. Never fails.
    pub async fn health(&self) -> HealthReport {
        let (store, cache) = tokio::join!(self.store.ping(), self.cache.probe());

        let store = match store {
            Ok(()) => StoreStatus::Up,
            Err(e) => {
                warn!(
                    backend = self.store.backend_name(),
                    error = %e,
                    "store-of-record health probe failed"
                );
                StoreStatus::Down
            }
        };

        HealthReport::new(store, cache)
    }

    async fn cached_snapshot(&self) -> Option<Vec<S::Entity>> {
        match self.cache.get(&self.key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(entities) => {
                    debug!(key = %self.key, "collection cache hit");
                    Some(entities)
                }
                Err(e) => {
                    warn!(key = %self.key, error = %e, "undecodable cache snapshot, reading store");
                    None
                }
            },
            Ok(None) => {
                debug!(key = %self.key, "collection cache miss");
                None
            }
            Err(e) => {
                warn!(
                    key = %self.key,
                    backend = self.cache.backend_name(),
                    error = %e,
                    "cache lookup failed, reading store"
                );
                None
            }
        }
    }

    async fn populate(&self, entities: &[S::Entity]) {
        let bytes = match serde_json::to_vec(entities) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to encode collection snapshot");
                return;
            }
        };

        if let Err(e) = self.cache.set(&self.key, bytes, self.ttl).await {
            warn!(
                key = %self.key,
                backend = self.cache.backend_name(),
                error = %e,
                "failed to populate collection cache"
            );
        }
    }

    async fn invalidate(&self) {
        if let Err(e) = self.cache.delete(&self.key).await {
            warn!(
                key = %self.key,
                backend = self.cache.backend_name(),
                error = %e,
                "failed to invalidate collection cache"
            );
        }
    }
}
