use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use serde_json::{Map, Value};
use thiserror::Error;

pub const KEY_API_KEY: &str = "apiKey";
pub const KEY_MODEL: &str = "model";
pub const KEY_CATEGORIES: &str = "categories";
pub const KEY_HISTORY: &str = "history";
pub const KEY_STATISTICS: &str = "statistics";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store file {} is not a JSON object: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("store file {} must contain a JSON object", path.display())]
    NotAnObject { path: PathBuf },
    #[error("failed to serialize store: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("stored value for '{key}' has an unexpected shape: {source}")]
    InvalidRecord {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid category: {0}")]
    InvalidCategory(String),
}

impl StoreError {
    fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Durable key/value storage for user data.
pub trait ConfigStore: Send + Sync {
    /// # Errors
    /// Returns an error if the backing storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// # Errors
    /// Returns an error if the value cannot be persisted.
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// # Errors
    /// Returns an error if the removal cannot be persisted.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values().remove(key);
        Ok(())
    }
}

/// All keys in one JSON object file, rewritten atomically on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or does not hold
    /// a JSON object. The file is never overwritten in that case.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => Map::new(),
            Ok(content) => {
                let value: Value = serde_json::from_str(&content).map_err(|source| {
                    StoreError::Corrupt {
                        path: path.clone(),
                        source,
                    }
                })?;
                match value {
                    Value::Object(map) => map,
                    _ => return Err(StoreError::NotAnObject { path }),
                }
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!("No store file at {}, starting empty", path.display());
                Map::new()
            }
            Err(error) => return Err(StoreError::io("failed to read", &path, error)),
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn values(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, values: &Map<String, Value>) -> Result<(), StoreError> {
        let dir = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .map_err(|error| StoreError::io("failed to create store directory", dir, error))?;

        let content = serde_json::to_vec_pretty(values).map_err(StoreError::Serialize)?;
        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|error| StoreError::io("failed to create temp file in", dir, error))?;
        temp.write_all(&content)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|error| StoreError::io("failed to write", temp.path(), error))?;
        temp.persist(&self.path).map_err(|error| {
            warn!("Failed to replace store file: {error}");
            StoreError::io("failed to replace", &self.path, error.error)
        })?;
        Ok(())
    }
}

impl ConfigStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut values = self.values();
        let previous = values.insert(key.to_string(), value);
        if let Err(error) = self.persist(&values) {
            match previous {
                Some(previous) => values.insert(key.to_string(), previous),
                None => values.remove(key),
            };
            return Err(error);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values();
        let Some(previous) = values.remove(key) else {
            return Ok(());
        };
        if let Err(error) = self.persist(&values) {
            values.insert(key.to_string(), previous);
            return Err(error);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn memory_store_round_trips_values() {
        let store = MemoryStore::new();
        assert_eq!(store.get(KEY_MODEL).expect("get"), None);

        store.set(KEY_MODEL, json!("mistral-small-latest")).expect("set");
        assert_eq!(
            store.get(KEY_MODEL).expect("get"),
            Some(json!("mistral-small-latest"))
        );

        store.remove(KEY_MODEL).expect("remove");
        assert_eq!(store.get(KEY_MODEL).expect("get"), None);
    }

    #[test]
    fn missing_file_opens_empty_and_set_creates_it() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("nested").join("store.json");

        let store = JsonFileStore::open(&path).expect("open missing store");
        assert_eq!(store.get(KEY_API_KEY).expect("get"), None);

        store.set(KEY_API_KEY, json!("sk-0123456789")).expect("set");

        let reopened = JsonFileStore::open(&path).expect("reopen");
        assert_eq!(
            reopened.get(KEY_API_KEY).expect("get"),
            Some(json!("sk-0123456789"))
        );
    }

    #[test]
    fn writes_leave_no_temp_files_behind() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("store.json");
        let store = JsonFileStore::open(&path).expect("open");

        store.set(KEY_MODEL, json!("a")).expect("set");
        store.set(KEY_MODEL, json!("b")).expect("set");
        store.remove(KEY_MODEL).expect("remove");

        let entries: Vec<_> = std::fs::read_dir(temp.path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("store.json")]);
    }

    #[test]
    fn corrupt_file_is_reported_and_left_alone() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("store.json");
        std::fs::write(&path, "{not json").expect("write corrupt store");

        assert!(matches!(
            JsonFileStore::open(&path),
            Err(StoreError::Corrupt { .. })
        ));
        assert_eq!(
            std::fs::read_to_string(&path).expect("read back"),
            "{not json"
        );

        std::fs::write(&path, "[1, 2]").expect("write array store");
        assert!(matches!(
            JsonFileStore::open(&path),
            Err(StoreError::NotAnObject { .. })
        ));
    }
}
