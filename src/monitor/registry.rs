//! # Persisted worker registry.
//!
//! The registry is the shared key/value view of the fleet: one
//! [`WorkerDescriptor`] per worker name. Workers write their own descriptor;
//! the supervisor reads it every pass and re-reads it right before acting.
//!
//! ## Adapters
//! - [`MemoryRegistry`]: in-process map, for tests and embedding.
//! - [`JsonDirRegistry`]: one `<dir>/<name>.json` file per worker (serde_json).
//!
//! ## Rules
//! - `get` on a missing key is `Ok(None)`, never an error.
//! - `list` is sorted, so passes visit workers in a stable order.
//! - `remove` on a missing key succeeds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::MonitorError;

/// Lifecycle state a worker reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    Starting,
    Running,
    /// Between iterations; the worker legitimately stops logging.
    Sleeping,
    Stopping,
    Completed,
    Dead,
}

/// Health status a worker reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Ok,
    Warning,
    Error,
    Dead,
}

impl WorkerState {
    /// Label as persisted (`RUNNING`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::Starting => "STARTING",
            WorkerState::Running => "RUNNING",
            WorkerState::Sleeping => "SLEEPING",
            WorkerState::Stopping => "STOPPING",
            WorkerState::Completed => "COMPLETED",
            WorkerState::Dead => "DEAD",
        }
    }
}

impl WorkerStatus {
    /// Label as persisted (`OK`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Ok => "OK",
            WorkerStatus::Warning => "WARNING",
            WorkerStatus::Error => "ERROR",
            WorkerStatus::Dead => "DEAD",
        }
    }

    /// True for the statuses a worker may legitimately finish with.
    #[inline]
    pub fn is_terminal_ok(self) -> bool {
        matches!(self, WorkerStatus::Ok | WorkerStatus::Warning | WorkerStatus::Error)
    }
}

/// Persisted view of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    /// Unique worker name (registry key).
    pub name: String,
    /// OS pid of the worker daemon, if known.
    #[serde(default)]
    pub pid: Option<u32>,
    pub state: WorkerState,
    pub status: WorkerStatus,
    /// Last error persisted by the worker.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl WorkerDescriptor {
    /// Creates a descriptor without pid or error.
    pub fn new(name: impl Into<String>, state: WorkerState, status: WorkerStatus) -> Self {
        Self {
            name: name.into(),
            pid: None,
            state,
            status,
            last_error: None,
        }
    }

    #[must_use]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    #[must_use]
    pub fn with_last_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }

    /// True once the worker finished on its own (`COMPLETED` with OK/WARNING/ERROR).
    #[inline]
    pub fn has_completed(&self) -> bool {
        self.state == WorkerState::Completed && self.status.is_terminal_ok()
    }
}

/// Access to the shared worker registry.
#[async_trait]
pub trait WorkerRegistry: Send + Sync + 'static {
    /// Returns the descriptor stored under `name`, if any.
    async fn get(&self, name: &str) -> Result<Option<WorkerDescriptor>, MonitorError>;

    /// True if a descriptor is stored under `name`.
    async fn has(&self, name: &str) -> Result<bool, MonitorError> {
        Ok(self.get(name).await?.is_some())
    }

    /// Returns all worker names, sorted.
    async fn list(&self) -> Result<Vec<String>, MonitorError>;

    /// Stores (or replaces) a descriptor under its name.
    async fn set(&self, descriptor: WorkerDescriptor) -> Result<(), MonitorError>;

    /// Removes the descriptor stored under `name`.
    async fn remove(&self, name: &str) -> Result<(), MonitorError>;
}

/// In-memory registry.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    workers: RwLock<HashMap<String, WorkerDescriptor>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkerRegistry for MemoryRegistry {
    async fn get(&self, name: &str) -> Result<Option<WorkerDescriptor>, MonitorError> {
        Ok(self.workers.read().await.get(name).cloned())
    }

    async fn has(&self, name: &str) -> Result<bool, MonitorError> {
        Ok(self.workers.read().await.contains_key(name))
    }

    async fn list(&self) -> Result<Vec<String>, MonitorError> {
        let workers = self.workers.read().await;
        let mut names: Vec<String> = workers.keys().cloned().collect();
        names.sort_unstable();
        Ok(names)
    }

    async fn set(&self, descriptor: WorkerDescriptor) -> Result<(), MonitorError> {
        self.workers
            .write()
            .await
            .insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), MonitorError> {
        self.workers.write().await.remove(name);
        Ok(())
    }
}

/// Registry backed by one JSON file per worker.
#[derive(Debug, Clone)]
pub struct JsonDirRegistry {
    dir: PathBuf,
}

impl JsonDirRegistry {
    /// Uses `dir` as storage; the directory is created on first `set`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File of worker `name`; names that could leave `dir` are rejected.
    fn path_of(&self, name: &str) -> Result<PathBuf, MonitorError> {
        let escapes = name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\', '\0']);
        if escapes {
            return Err(MonitorError::Registry {
                key: name.to_string(),
                reason: "invalid worker name".to_string(),
            });
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}

#[async_trait]
impl WorkerRegistry for JsonDirRegistry {
    async fn get(&self, name: &str) -> Result<Option<WorkerDescriptor>, MonitorError> {
        let path = self.path_of(name)?;
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(MonitorError::Io { path, source }),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| MonitorError::Decode {
                key: name.to_string(),
                source,
            })
    }

    async fn list(&self) -> Result<Vec<String>, MonitorError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(MonitorError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut names = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|source| MonitorError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let Some(entry) = entry else { break };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort_unstable();
        Ok(names)
    }

    async fn set(&self, descriptor: WorkerDescriptor) -> Result<(), MonitorError> {
        let path = self.path_of(&descriptor.name)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| MonitorError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let raw = serde_json::to_vec_pretty(&descriptor).map_err(|source| MonitorError::Decode {
            key: descriptor.name.clone(),
            source,
        })?;

        // write-then-rename keeps readers from seeing half a file
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw)
            .await
            .map_err(|source| MonitorError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| MonitorError::Io { path, source })
    }

    async fn remove(&self, name: &str) -> Result<(), MonitorError> {
        let path = self.path_of(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(MonitorError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_serializes_screaming_case() {
        let d = WorkerDescriptor::new("FM_01", WorkerState::Sleeping, WorkerStatus::Ok).with_pid(42);
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains("\"state\":\"SLEEPING\""));
        assert!(json.contains("\"status\":\"OK\""));

        let back: WorkerDescriptor =
            serde_json::from_str(r#"{"name":"X","state":"COMPLETED","status":"WARNING"}"#).unwrap();
        assert!(back.has_completed());
        assert_eq!(back.pid, None);
    }

    #[tokio::test]
    async fn test_memory_registry_lists_sorted() {
        let reg = MemoryRegistry::new();
        for name in ["b", "a", "c"] {
            reg.set(WorkerDescriptor::new(name, WorkerState::Running, WorkerStatus::Ok))
                .await
                .unwrap();
        }
        assert_eq!(reg.list().await.unwrap(), ["a", "b", "c"]);
        reg.remove("b").await.unwrap();
        assert!(!reg.has("b").await.unwrap());
        assert!(reg.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_dir_registry_crud() {
        let dir = tempfile::tempdir().unwrap();
        let reg = JsonDirRegistry::new(dir.path().join("reg"));
        assert!(reg.list().await.unwrap().is_empty());

        let d = WorkerDescriptor::new("CMSYNC_02", WorkerState::Running, WorkerStatus::Error)
            .with_last_error("timeout talking to target");
        reg.set(d.clone()).await.unwrap();
        std::fs::write(reg.dir().join("notes.txt"), b"ignored").unwrap();

        assert_eq!(reg.list().await.unwrap(), ["CMSYNC_02"]);
        assert_eq!(reg.get("CMSYNC_02").await.unwrap(), Some(d));
        assert!(reg.has("CMSYNC_02").await.unwrap());

        reg.remove("CMSYNC_02").await.unwrap();
        reg.remove("CMSYNC_02").await.unwrap();
        assert!(reg.get("CMSYNC_02").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_dir_registry_reports_corrupt_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("BAD.json"), b"{not json").unwrap();
        let reg = JsonDirRegistry::new(dir.path());
        let err = reg.get("BAD").await.unwrap_err();
        assert_eq!(err.as_label(), "monitor_decode");
    }

    #[tokio::test]
    async fn test_json_dir_registry_rejects_names_leaving_dir() {
        let dir = tempfile::tempdir().unwrap();
        let reg = JsonDirRegistry::new(dir.path().join("reg"));

        for name in ["../escaped", "a/b", "..\\x", ".hidden", ""] {
            let d = WorkerDescriptor::new(name, WorkerState::Running, WorkerStatus::Ok);
            let err = reg.set(d).await.unwrap_err();
            assert_eq!(err.as_label(), "monitor_registry");
            assert!(reg.get(name).await.is_err());
            assert!(reg.remove(name).await.is_err());
        }
        assert!(!dir.path().join("escaped.json").exists());
        assert!(!dir.path().join("reg").exists());

        reg.set(WorkerDescriptor::new("FM-01.v2", WorkerState::Running, WorkerStatus::Ok))
            .await
            .unwrap();
        assert_eq!(reg.list().await.unwrap(), ["FM-01.v2"]);
    }
}
