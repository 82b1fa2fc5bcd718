// Local persistence adapter.
//
// Entity collections are stored as JSON documents under fixed keys. A missing
// or unreadable value always loads as the default, never as an error.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;

use crate::error::SyncResult;

pub const TIMERS_KEY: &str = "countdown-timers";
pub const EVENTS_KEY: &str = "countdown-events";
pub const SETTINGS_KEY: &str = "countdown-settings";

/// Key under which cloud-mode state for `uid` is cached on this device.
pub fn cache_key(base: &str, uid: &str) -> String {
    format!("{base}@{uid}")
}

/// Raw string key-value backend.
pub trait KeyValueStore: Send + Sync {
    fn read(&self, key: &str) -> io::Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> io::Result<()>;
    fn remove(&self, key: &str) -> io::Result<()>;
}

/// One `<key>.json` file per key inside a data directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // Anything outside [A-Za-z0-9_@-] is percent-encoded, so distinct keys
    // never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        let mut file = String::with_capacity(key.len());
        for byte in key.bytes() {
            match byte {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'@' => {
                    file.push(byte as char)
                }
                _ => file.push_str(&format!("%{byte:02X}")),
            }
        }
        self.dir.join(format!("{file}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, key: &str, value: &str) -> io::Result<()> {
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");

        fs::create_dir_all(&self.dir)?;
        fs::write(&tmp_path, value)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// In-memory backend, handy for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// Typed JSON view over a [`KeyValueStore`].
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn KeyValueStore>,
}

impl LocalStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Loads `key`, treating absent or malformed data as the default value.
    pub fn load<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.load_opt(key).unwrap_or_default()
    }

    /// Loads `key`, or `None` when it is absent or malformed.
    pub fn load_opt<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let text = match self.backend.read(key) {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "local read failed, using default");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "malformed local data, using default");
                None
            }
        }
    }

    /// Loads a JSON array under `key` entry by entry. Malformed entries are
    /// skipped; the second value is the raw entry count.
    pub fn load_items<T: DeserializeOwned>(&self, key: &str) -> (Vec<T>, usize) {
        let raw: Vec<serde_json::Value> = self.load(key);
        let total = raw.len();
        let items = raw
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(key, error = %e, "skipping malformed local entry");
                    None
                }
            })
            .collect();
        (items, total)
    }

    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> SyncResult<()> {
        let text = serde_json::to_string_pretty(value)?;
        self.backend.write(key, &text)?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> SyncResult<()> {
        self.backend.remove(key)?;
        Ok(())
    }

    /// Whether `key` holds a non-empty JSON array.
    pub fn has_items(&self, key: &str) -> bool {
        !self.load::<Vec<serde_json::Value>>(key).is_empty()
    }
}
