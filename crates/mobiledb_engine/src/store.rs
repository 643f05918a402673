//! Storage directory management.
//!
//! Layout of a storage directory:
//!
//! ```text
//! <dbPath>/
//! ├─ mongod.lock          # Advisory lock held while an instance is open
//! └─ collections.json     # Documents of every collection
//! ```

use crate::error::{EngineError, EngineResult};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "mongod.lock";
const DATA_FILE: &str = "collections.json";
const DATA_TEMP: &str = "collections.json.tmp";

/// Documents of one storage instance, keyed by `<db>.<collection>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Store {
    /// Collections by namespace.
    pub collections: BTreeMap<String, Vec<Value>>,
    /// Next generated `_id`.
    pub next_id: u64,
}

impl Store {
    /// Returns a fresh `_id` value.
    pub fn generate_id(&mut self) -> Value {
        self.next_id += 1;
        Value::String(format!("{:024x}", self.next_id))
    }
}

/// An opened storage directory.
///
/// Holds an exclusive lock on the directory until dropped.
#[derive(Debug)]
pub struct StorageDir {
    path: PathBuf,
    _lock_file: File,
}

impl StorageDir {
    /// Opens an existing directory and locks it.
    ///
    /// # Errors
    ///
    /// - `NonExistentPath` if `path` is not an existing directory
    /// - `DbPathInUse` if another instance holds the lock
    pub fn open(path: &Path) -> EngineResult<Self> {
        if !path.is_dir() {
            return Err(EngineError::NonExistentPath {
                path: path.to_path_buf(),
            });
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(EngineError::DbPathInUse {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored documents; an empty store for a new directory.
    pub fn load(&self) -> EngineResult<Store> {
        let data_path = self.path.join(DATA_FILE);
        if !data_path.exists() {
            return Ok(Store::default());
        }

        let data = fs::read(&data_path)?;
        if data.is_empty() {
            return Ok(Store::default());
        }
        Ok(serde_json::from_slice(&data)?)
    }

    /// Saves the documents atomically (write temp, sync, rename).
    pub fn save(&self, store: &Store) -> EngineResult<()> {
        let temp_path = self.path.join(DATA_TEMP);
        let data = serde_json::to_vec(store)?;

        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.path.join(DATA_FILE))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = StorageDir::open(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, EngineError::NonExistentPath { .. }));
    }

    #[test]
    fn lock_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let first = StorageDir::open(dir.path()).unwrap();
        let err = StorageDir::open(dir.path()).unwrap_err();
        assert!(matches!(err, EngineError::DbPathInUse { .. }));

        drop(first);
        StorageDir::open(dir.path()).unwrap();
    }

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let storage = StorageDir::open(dir.path()).unwrap();
        assert_eq!(storage.load().unwrap(), Store::default());

        let mut store = Store::default();
        let id = store.generate_id();
        store
            .collections
            .insert("test.foo".into(), vec![json!({"_id": id, "test": 42})]);
        storage.save(&store).unwrap();

        assert_eq!(storage.load().unwrap(), store);
        assert!(!dir.path().join(DATA_TEMP).exists());
    }

    #[test]
    fn corrupt_data_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(DATA_FILE), b"{not json").unwrap();
        let storage = StorageDir::open(dir.path()).unwrap();
        let err = storage.load().unwrap_err();
        assert!(matches!(err, EngineError::FailedToParse { .. }));
    }
}
