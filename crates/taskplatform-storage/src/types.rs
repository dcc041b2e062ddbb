//! Task domain types and the command/health records used by the storage traits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::StorageError;

/// Maximum title length accepted by every backend (`VARCHAR(255)`).
pub const MAX_TITLE_LEN: usize = 255;

/// Identifier assigned by the store-of-record on creation.
pub type TaskId = i64;

/// Workflow state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [Self::Pending, Self::InProgress, Self::Completed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(StorageError::validation(format!(
                "Invalid status '{other}': expected one of pending, in_progress, completed"
            ))),
        }
    }
}

/// A task as stored by the store-of-record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Input validation applied before a command reaches the store-of-record.
pub trait Validate {
    fn validate(&self) -> Result<(), StorageError>;
}

/// Fields for creating a task. `title` is optional at the type level so that
/// a body without it is reported as a validation error rather than a decode
/// failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The validated title. Backends call this after [`Validate::validate`].
    pub fn title(&self) -> Result<&str, StorageError> {
        match self.title.as_deref() {
            Some(title) if !title.is_empty() => Ok(title),
            _ => Err(StorageError::validation("Title is required")),
        }
    }
}

impl Validate for NewTask {
    fn validate(&self) -> Result<(), StorageError> {
        check_title_len(self.title()?)
    }
}

/// Partial update: only the provided fields change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

impl TaskPatch {
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Applies the provided fields to `task`, leaving the rest unchanged.
    /// Does not touch timestamps; those belong to the store-of-record.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = Some(description.clone());
        }
        if let Some(status) = self.status {
            task.status = status;
        }
    }
}

impl Validate for TaskPatch {
    fn validate(&self) -> Result<(), StorageError> {
        self.title.as_deref().map_or(Ok(()), check_title_len)
    }
}

fn check_title_len(title: &str) -> Result<(), StorageError> {
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(StorageError::validation(format!(
            "Title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

/// A write against the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<I, D, P> {
    Create(D),
    Update(I, P),
    Delete(I),
}

impl<I, D, P> Command<I, D, P> {
    /// Short name for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Update(..) => "update",
            Self::Delete(_) => "delete",
        }
    }
}

/// Command over the task collection.
pub type TaskCommand = Command<TaskId, NewTask, TaskPatch>;

/// Per-status counts over the task collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
}

impl TaskStats {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        tasks.iter().fold(Self::default(), |mut stats, task| {
            stats.total += 1;
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Completed => stats.completed += 1,
            }
            stats
        })
    }
}

// ==================== Health ====================

/// Liveness of the store-of-record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    Up,
    Down,
}

/// Liveness of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Up,
    Down,
    /// No cache is configured, or no connection could be established.
    Disconnected,
}

/// Aggregate status: healthy only when every dependency is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub store: StoreStatus,
    pub cache: CacheStatus,
}

impl HealthReport {
    pub fn new(store: StoreStatus, cache: CacheStatus) -> Self {
        let status = if store == StoreStatus::Up && cache == CacheStatus::Up {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        Self {
            status,
            store,
            cache,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
