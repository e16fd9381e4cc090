//! Task persistence.
//!
//! A single task slot: saving replaces whatever was stored, loading returns
//! it if present. The file-backed store survives page reloads; the memory
//! store backs tests.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::task::Task;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("task serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn save(&self, task: &Task) -> Result<(), StorageError>;
    async fn load(&self) -> Result<Option<Task>, StorageError>;
    async fn clear(&self) -> Result<(), StorageError>;
}

/// Volatile store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    slot: Mutex<Option<Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn save(&self, task: &Task) -> Result<(), StorageError> {
        *self.slot.lock().await = Some(task.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<Task>, StorageError> {
        Ok(self.slot.lock().await.clone())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        *self.slot.lock().await = None;
        Ok(())
    }
}

/// JSON file store. A missing file reads as "no task".
#[derive(Debug)]
pub struct FileTaskStore {
    path: PathBuf,
}

impl FileTaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn save(&self, task: &Task) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(task)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, json).await?;
        debug!(path = %self.path.display(), task_id = %task.id, "saved task");
        Ok(())
    }

    async fn load(&self) -> Result<Option<Task>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<(), StorageError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::activity::{FilterCriteria, UpdateCriteria};
    use crate::domain::rule::Rule;
    use crate::domain::task::Scenario;

    fn sample_task() -> Task {
        Task::new(
            Scenario::Bikes,
            FilterCriteria::default(),
            UpdateCriteria { gear_id: Some("bike_1".into()), ..Default::default() },
            Rule::default(),
        )
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryTaskStore::new();
        assert!(store.load().await.unwrap().is_none());
        let task = sample_task();
        store.save(&task).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.id, task.id);
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTaskStore::new(dir.path().join("task.json"));
        assert!(store.load().await.unwrap().is_none());
        let task = sample_task();
        store.save(&task).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.id, task.id);
        assert_eq!(loaded.scenario, task.scenario);
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        // clearing twice is harmless
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        let store = FileTaskStore::new(path);
        assert!(matches!(store.load().await, Err(StorageError::Serde(_))));
    }
}
