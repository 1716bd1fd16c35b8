//! Persisted client-side key/value storage.
//!
//! Values are stored as JSON strings, so a string `"ahv1_x"` is stored as
//! `"\"ahv1_x\""`. A value that fails to decode reads as absent.

use std::io::Write;
use std::path::PathBuf;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A string-keyed store that survives across sessions.
pub trait Storage: Send + Sync + 'static {
    fn get_raw(&self, key: &str) -> Option<String>;

    fn set_raw(&self, key: &str, value: String) -> std::io::Result<()>;

    fn remove(&self, key: &str) -> std::io::Result<()>;
}

impl dyn Storage {
    /// Read and decode a JSON value.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::debug!(key, %error, "ignoring undecodable storage value");
                None
            }
        }
    }

    /// Encode and store a JSON value.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> std::io::Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, raw)
    }
}

/// In-memory storage, lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_raw(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|value| value.value().clone())
    }

    fn set_raw(&self, key: &str, value: String) -> std::io::Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> std::io::Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Storage backed by a JSON object in a file.
///
/// Every write rewrites the whole file through a temporary file in the same
/// directory, so readers never see a half-written file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<serde_json::Map<String, serde_json::Value>>,
}

impl FileStorage {
    /// Open the store, starting empty when the file does not exist or cannot be decoded.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|error| {
                tracing::warn!(path = %path.display(), %error, "discarding corrupt storage file");
                serde_json::Map::new()
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => serde_json::Map::new(),
            Err(error) => return Err(error),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &serde_json::Map<String, serde_json::Value>) -> std::io::Result<()> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(directory)?;
        file.write_all(&serde_json::to_vec(entries)?)?;
        file.persist(&self.path).map_err(|error| error.error)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get_raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).and_then(|value| match value {
            serde_json::Value::String(raw) => Some(raw.clone()),
            _ => None,
        })
    }

    fn set_raw(&self, key: &str, value: String) -> std::io::Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), serde_json::Value::String(value));
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> std::io::Result<()> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}
