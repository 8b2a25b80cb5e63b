use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tempfile::NamedTempFile;
use tracing::debug;

use super::{KeyValueStore, PersistenceError};

/// File name used for the store inside the data directory
pub const STORAGE_FILE: &str = "storage.json";

/// Key/value store backed by one JSON object on disk.
///
/// Every write rewrites the whole file into a sibling temp file and renames
/// it over the old one, so a crash mid-write leaves the previous contents.
/// The lock only serializes writers inside this process.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at `<dir>/storage.json`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(STORAGE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, PersistenceError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), PersistenceError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let contents = serde_json::to_string_pretty(entries)?;
        let mut staged = NamedTempFile::new_in(dir)?;
        staged.write_all(contents.as_bytes())?;
        staged.as_file().sync_all()?;
        staged.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)?;
        debug!(key, path = %self.path.display(), "Stored value");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
            debug!(key, path = %self.path.display(), "Removed value");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, FileStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::in_dir(dir.path());
        (dir, store)
    }

    #[test]
    fn test_missing_file_reads_as_empty() {
        let (_dir, store) = temp_store();
        assert_eq!(store.get("authToken").unwrap(), None);
    }

    #[test]
    fn test_values_survive_a_new_instance() {
        let (dir, store) = temp_store();
        store.set("authToken", "abc").unwrap();
        store.set("chatHistory", "[]").unwrap();

        let reopened = FileStore::in_dir(dir.path());
        assert_eq!(reopened.get("authToken").unwrap().as_deref(), Some("abc"));
        assert_eq!(reopened.get("chatHistory").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_remove_only_touches_one_key() {
        let (_dir, store) = temp_store();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        store.remove("a").unwrap();
        store.remove("a").unwrap(); // missing key is fine

        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.get("b").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_corrupt_file_is_a_serialization_error() {
        let (_dir, store) = temp_store();
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(matches!(
            store.get("authToken"),
            Err(PersistenceError::Serialization(_))
        ));
    }

    #[test]
    fn test_creates_missing_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::in_dir(&dir.path().join("nested").join("data"));
        store.set("authToken", "abc").unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_writes_replace_the_file_without_leftovers() {
        let (dir, store) = temp_store();
        std::fs::write(store.path(), r#"{"authToken":"old"}"#).unwrap();

        store.set("authToken", "new").unwrap();
        store.set("chatHistory", "[]").unwrap();
        store.remove("chatHistory").unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(STORAGE_FILE)]);

        let on_disk: BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(on_disk.get("authToken").map(String::as_str), Some("new"));
        assert_eq!(on_disk.len(), 1);
    }
}
