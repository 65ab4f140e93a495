//! Key/value persistence for snapshots.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{HostError, HostResult};

/// Persistent storage for serialized snapshots
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the contents stored under `key`, `None` when absent
    async fn read(&self, key: &str) -> HostResult<Option<String>>;

    /// Replace the contents stored under `key`
    async fn write(&self, key: &str, contents: &str) -> HostResult<()>;
}

/// Store writing one `<key>.json` file per key into a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Store rooted at `dir`; the directory is created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the files
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn read(&self, key: &str) -> HostResult<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HostError::io(path, e)),
        }
    }

    async fn write(&self, key: &str, contents: &str) -> HostResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| HostError::io(&self.dir, e))?;
        atomic_write(&self.path_for(key), contents.as_bytes()).await
    }
}

/// Write to a sibling temp file, then rename over the target.
async fn atomic_write(path: &Path, data: &[u8]) -> HostResult<()> {
    // Same directory keeps the rename on one filesystem
    let temp_path = path.with_file_name(format!(
        "{}.tmp.{:016x}",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("state"),
        fastrand::u64(..)
    ));

    if let Err(e) = tokio::fs::write(&temp_path, data).await {
        return Err(HostError::io(temp_path, e));
    }

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(HostError::io(path, e));
    }

    Ok(())
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents stored under `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    /// Seed `key` directly
    pub fn insert(&self, key: impl Into<String>, contents: impl Into<String>) {
        self.entries.lock().insert(key.into(), contents.into());
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn read(&self, key: &str) -> HostResult<Option<String>> {
        Ok(self.get(key))
    }

    async fn write(&self, key: &str, contents: &str) -> HostResult<()> {
        self.insert(key, contents);
        Ok(())
    }
}
