//! Persistent JSON records.
//!
//! One file per record key under the storage directory
//! (`~/.config/plugin-matter-bridge` by default). An in-memory store keeps
//! the same semantics for tests and dry runs.

use crate::error::{BridgeError, Result};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const APP_DIR: &str = "plugin-matter-bridge";

#[derive(Clone)]
pub struct Storage {
    backend: Arc<Backend>,
}

enum Backend {
    Memory(Mutex<HashMap<String, serde_json::Value>>),
    Files(PathBuf),
}

impl Storage {
    /// Storage that lives only as long as this process.
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(Backend::Memory(Mutex::new(HashMap::new()))),
        }
    }

    /// File-backed storage rooted at `dir`.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: Arc::new(Backend::Files(dir.into())),
        }
    }

    /// Default storage directory under the user's config dir.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config").join(APP_DIR))
    }

    pub fn dir(&self) -> Option<&Path> {
        match self.backend.as_ref() {
            Backend::Files(dir) => Some(dir),
            Backend::Memory(_) => None,
        }
    }

    /// Load a record. Returns `Ok(None)` if it was never saved.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.backend.as_ref() {
            Backend::Memory(records) => records
                .lock()
                .get(key)
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .map_err(BridgeError::from),
            Backend::Files(dir) => {
                let path = record_path(dir, key);
                match fs::read(&path) {
                    Ok(bytes) => {
                        let record = serde_json::from_slice(&bytes).map_err(|e| {
                            warn!("[Storage] Failed to parse {:?}: {}", path, e);
                            BridgeError::Storage(format!("{}: {}", path.display(), e))
                        })?;
                        debug!("[Storage] Loaded {:?}", path);
                        Ok(Some(record))
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Save a record, replacing any previous value.
    pub fn save<T: Serialize>(&self, key: &str, record: &T) -> Result<()> {
        match self.backend.as_ref() {
            Backend::Memory(records) => {
                records
                    .lock()
                    .insert(key.to_string(), serde_json::to_value(record)?);
                Ok(())
            }
            Backend::Files(dir) => {
                fs::create_dir_all(dir)?;
                let path = record_path(dir, key);
                let data = serde_json::to_vec_pretty(record)?;
                fs::write(&path, data)?;
                info!("[Storage] Saved {:?}", path);
                Ok(())
            }
        }
    }
}

/// File name for a record key. Bytes outside `[A-Za-z0-9_-]` are written
/// as `%XX`, so distinct keys never share a file.
fn record_path(dir: &Path, key: &str) -> PathBuf {
    let mut name = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("%{:02X}", byte));
        }
    }
    dir.join(format!("{}.json", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        value: u32,
    }

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pmb-storage-{}-{}", tag, uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_memory_round_trip() {
        let storage = Storage::in_memory();
        assert_eq!(storage.load::<Record>("a").unwrap(), None);
        let record = Record {
            name: "a".to_string(),
            value: 7,
        };
        storage.save("a", &record).unwrap();
        assert_eq!(storage.load::<Record>("a").unwrap(), Some(record));
        assert!(storage.dir().is_none());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = temp_dir("files");
        let storage = Storage::at(&dir);
        let record = Record {
            name: "Kitchen bridge".to_string(),
            value: 3840,
        };
        storage.save("Kitchen bridge", &record).unwrap();
        assert!(dir.join("Kitchen%20bridge.json").exists());

        let reopened = Storage::at(&dir);
        assert_eq!(reopened.load::<Record>("Kitchen bridge").unwrap(), Some(record));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = temp_dir("corrupt");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("bad.json"), b"{not json").unwrap();
        let storage = Storage::at(&dir);
        assert!(matches!(
            storage.load::<Record>("bad"),
            Err(BridgeError::Storage(_))
        ));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_distinct_keys_use_distinct_files() {
        let dir = Path::new("/state");
        let keys = ["my plugin", "my_plugin", "my%20plugin", "café", "a/b", "a_b"];
        let paths: std::collections::HashSet<_> =
            keys.iter().map(|key| record_path(dir, key)).collect();
        assert_eq!(paths.len(), keys.len());
        assert_eq!(record_path(dir, "a/b"), dir.join("a%2Fb.json"));
        assert_eq!(record_path(dir, "café"), dir.join("caf%C3%A9.json"));

        let storage = Storage::at(temp_dir("distinct"));
        storage.save("my plugin", &1u32).unwrap();
        storage.save("my_plugin", &2u32).unwrap();
        assert_eq!(storage.load::<u32>("my plugin").unwrap(), Some(1));
        assert_eq!(storage.load::<u32>("my_plugin").unwrap(), Some(2));
        if let Some(dir) = storage.dir() {
            let _ = fs::remove_dir_all(dir);
        }
    }
}
