use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use taskplatform_storage::{
    CollectionStore, NewTask, StorageError, Task, TaskId, TaskPatch, TaskStatus,
};
use time::OffsetDateTime;

/// In-memory task storage backend using papaya lock-free HashMap.
///
/// This storage implementation provides:
/// - Lock-free concurrent access via papaya::HashMap
/// - Monotonically increasing ids, starting at 1
/// - The same newest-first ordering contract as the PostgreSQL backend
/// - A simulated outage switch for exercising store-unavailable paths
#[derive(Debug)]
pub struct InMemoryStorage {
    data: Arc<PapayaHashMap<TaskId, Task>>,
    id_counter: AtomicI64,
    available: AtomicBool,
}

impl InMemoryStorage {
    /// Creates a new, empty in-memory storage.
    pub fn new() -> Self {
        Self {
            data: Arc::new(PapayaHashMap::new()),
            id_counter: AtomicI64::new(1),
            available: AtomicBool::new(true),
        }
    }

    /// Simulates the store going down (`false`) or coming back (`true`).
    /// While down, every operation fails with `StorageError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.data.pin().len()
    }

    fn next_id(&self) -> TaskId {
        self.id_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<(), StorageError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::unavailable("in-memory store is offline"))
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CollectionStore for InMemoryStorage {
    type Entity = Task;
    type Id = TaskId;
    type Draft = NewTask;
    type Patch = TaskPatch;

    async fn list(&self) -> Result<Vec<Task>, StorageError> {
        self.ensure_available()?;

        let guard = self.data.pin();
        let mut tasks: Vec<Task> = guard.iter().map(|(_, task)| task.clone()).collect();
        tasks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(tasks)
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StorageError> {
        self.ensure_available()?;

        let guard = self.data.pin();
        Ok(guard.get(&id).cloned())
    }

    async fn insert(&self, draft: &NewTask) -> Result<Task, StorageError> {
        self.ensure_available()?;

        let now = OffsetDateTime::now_utc();
        let task = Task {
            id: self.next_id(),
            title: draft.title()?.to_string(),
            description: draft.description.clone(),
            status: TaskStatus::default(),
            created_at: now,
            updated_at: now,
        };

        let guard = self.data.pin();
        guard.insert(task.id, task.clone());
        Ok(task)
    }

    async fn update(&self, id: TaskId, patch: &TaskPatch) -> Result<Option<Task>, StorageError> {
        self.ensure_available()?;

        let guard = self.data.pin();
        let updated = guard.update(id, |current| {
            let mut task = current.clone();
            patch.apply_to(&mut task);
            task.updated_at = OffsetDateTime::now_utc();
            task
        });
        Ok(updated.cloned())
    }

    async fn delete(&self, id: TaskId) -> Result<Option<Task>, StorageError> {
        self.ensure_available()?;

        let guard = self.data.pin();
        Ok(guard.remove(&id).cloned())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.ensure_available()
    }

    fn entity_name(&self) -> &'static str {
        "Task"
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_storage_basic_operations() {
        let storage = InMemoryStorage::new();

        let created = storage.insert(&NewTask::new("first")).await.unwrap();
        assert_eq!(created.id, 1);
        assert_eq!(created.status, TaskStatus::Pending);
        assert_eq!(created.created_at, created.updated_at);
        assert_eq!(storage.count(), 1);

        let retrieved = storage.get(created.id).await.unwrap();
        assert_eq!(retrieved, Some(created.clone()));

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let updated = storage
            .update(created.id, &TaskPatch::status(TaskStatus::InProgress))
            .await
            .unwrap()
            .expect("task exists");
        assert_eq!(updated.status, TaskStatus::InProgress);
        assert_eq!(updated.title, "first");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);

        let deleted = storage.delete(created.id).await.unwrap();
        assert_eq!(deleted.map(|t| t.id), Some(created.id));
        assert_eq!(storage.get(created.id).await.unwrap(), None);
        assert_eq!(storage.count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_ids_return_none() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.get(99).await.unwrap(), None);
        assert_eq!(
            storage
                .update(99, &TaskPatch::status(TaskStatus::Completed))
                .await
                .unwrap(),
            None
        );
        assert_eq!(storage.delete(99).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let storage = InMemoryStorage::new();
        for title in ["a", "b", "c"] {
            storage.insert(&NewTask::new(title)).await.unwrap();
        }

        let ids: Vec<TaskId> = storage.list().await.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_insert_rejects_missing_title() {
        let storage = InMemoryStorage::new();
        let err = storage.insert(&NewTask::default()).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(storage.count(), 0);
    }

    #[tokio::test]
    async fn test_offline_store_is_unavailable() {
        let storage = InMemoryStorage::new();
        storage.set_available(false);

        assert!(storage.list().await.unwrap_err().is_unavailable());
        assert!(storage.get(1).await.unwrap_err().is_unavailable());
        assert!(storage.insert(&NewTask::new("x")).await.unwrap_err().is_unavailable());
        assert!(storage.ping().await.is_err());

        storage.set_available(true);
        assert!(storage.ping().await.is_ok());
    }
}
