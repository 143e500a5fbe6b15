//! Key-value blob storage for persisted AI state.
//!
//! Only faction standings are persisted. The host decides where blobs live;
//! [`MemoryStore`] and [`FileStore`] cover tests and desktop builds.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Blobs above this size are treated as corrupt
const MAX_BLOB_SIZE: u64 = 1024 * 1024;

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid key '{0}'")]
    InvalidKey(String),
}

/// Opaque string blobs addressed by key
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<(), PersistenceError>;
}

/// In-memory store
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), PersistenceError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.path_for(key).ok()?;
        if !path.exists() {
            debug!("No stored blob at {}", path.display());
            return None;
        }

        let metadata = fs::metadata(&path).ok()?;
        if metadata.len() > MAX_BLOB_SIZE {
            warn!(
                "Stored blob {} too large ({} bytes > {} limit), ignoring",
                path.display(),
                metadata.len(),
                MAX_BLOB_SIZE
            );
            return None;
        }

        match fs::read_to_string(&path) {
            Ok(contents) => Some(contents),
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), PersistenceError> {
        let path = self.path_for(key)?;
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        fs::write(&path, value)?;
        debug!("Saved blob {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("fleet-ai-{}-{}", name, std::process::id()))
    }

    #[test]
    fn test_memory_store_round_trip() {
        let mut store = MemoryStore::new();
        assert!(store.get("standings").is_none());
        store.set("standings", "{}".to_string()).unwrap();
        assert_eq!(store.get("standings").as_deref(), Some("{}"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = scratch_dir("roundtrip");
        let mut store = FileStore::new(&dir);
        store.set("standings", "{\"a\":1}".to_string()).unwrap();
        assert_eq!(store.get("standings").as_deref(), Some("{\"a\":1}"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_file_store_rejects_path_keys() {
        let mut store = FileStore::new(scratch_dir("keys"));
        let result = store.set("../escape", String::new());
        assert!(matches!(result, Err(PersistenceError::InvalidKey(_))));
        assert!(store.get("a/b").is_none());
    }
}
