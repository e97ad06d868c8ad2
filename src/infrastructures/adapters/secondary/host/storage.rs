use crate::domain::errors::TravisError;
use crate::domain::external_apis::host::SessionStorage;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Session storage that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    items: Mutex<HashMap<String, String>>,
}

impl SessionStorage for MemorySessionStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.lock().ok()?.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), TravisError> {
        self.items
            .lock()
            .map_err(|e| TravisError::Storage(e.to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Session storage kept in a single JSON object on disk, so a restarted
/// process picks up where the last one left off until `clear` is called.
#[derive(Debug)]
pub struct FileSessionStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<HashMap<String, String>, TravisError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                TravisError::Storage(format!("{} is not a storage file: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(TravisError::Storage(e.to_string())),
        }
    }

    /// Ends the session by removing the backing file.
    pub fn clear(&self) -> Result<(), TravisError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| TravisError::Storage(e.to_string()))?;
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                Err(TravisError::Storage(e.to_string()))
            }
            _ => Ok(()),
        }
    }
}

impl SessionStorage for FileSessionStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().ok()?;
        match self.read_all() {
            Ok(mut items) => items.remove(key),
            Err(e) => {
                tracing::warn!("Failed to read session storage: {}", e);
                None
            }
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), TravisError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| TravisError::Storage(e.to_string()))?;
        // A corrupt file is replaced rather than blocking every later save.
        let mut items = self.read_all().unwrap_or_default();
        items.insert(key.to_string(), value.to_string());
        let raw =
            serde_json::to_string_pretty(&items).map_err(|e| TravisError::Storage(e.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|e| TravisError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("travisci-builds-{}-{name}.json", std::process::id()))
    }

    #[test]
    fn memory_storage_round_trips() {
        let storage = MemorySessionStorage::default();
        assert!(storage.get_item("k").is_none());
        storage.set_item("k", "v").unwrap();
        assert_eq!(storage.get_item("k").as_deref(), Some("v"));
    }

    #[test]
    fn file_storage_survives_a_new_handle_until_cleared() {
        let path = temp_path("survives");
        let storage = FileSessionStorage::new(&path);
        storage.set_item("a", "1").unwrap();
        storage.set_item("b", "2").unwrap();

        let reopened = FileSessionStorage::new(&path);
        assert_eq!(reopened.get_item("a").as_deref(), Some("1"));
        assert_eq!(reopened.get_item("b").as_deref(), Some("2"));

        reopened.clear().unwrap();
        assert!(reopened.get_item("a").is_none());
        reopened.clear().unwrap();
    }

    #[test]
    fn corrupt_file_reads_as_empty_and_is_overwritten() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "garbage").unwrap();
        let storage = FileSessionStorage::new(&path);

        assert!(storage.get_item("a").is_none());
        storage.set_item("a", "1").unwrap();
        assert_eq!(storage.get_item("a").as_deref(), Some("1"));
        storage.clear().unwrap();
    }
}
