use std::{
    collections::BTreeMap,
    fmt::Display,
    fs::{self, File},
    io::{self, BufReader},
    path::PathBuf,
};

use serde::{de::DeserializeOwned, Serialize};

/// Key holding the JSON-encoded session object.
pub const USER_KEY: &str = "user";
/// Key holding the JSON-encoded post mirror.
pub const POSTS_KEY: &str = "posts";

/// String-keyed persisted state. Values are JSON documents stored as text.
pub trait LocalStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Scheme(serde_json::Error),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::Scheme(e) => e.fmt(f),
        }
    }
}
impl std::error::Error for StoreError {}

/// Store backed by a single JSON object file, rewritten on every change.
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

/// Store that lives only as long as the process.
#[derive(Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl FileStore {
    /// Opens the store at `path`. A missing file is an empty store; a file
    /// that does not decode is reported and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let entries = 'brk: {
            let file = match File::open(&path) {
                Ok(f) => BufReader::new(f),
                Err(e) if e.kind() == io::ErrorKind::NotFound => break 'brk BTreeMap::new(),
                Err(e) => return Err(StoreError::Io(e)),
            };

            match serde_json::from_reader(file) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "failed to parse store file: {e}");
                    BTreeMap::new()
                }
            }
        };

        Ok(Self { path, entries })
    }

    fn flush(&self) -> Result<(), StoreError> {
        let data = serde_json::to_string(&self.entries).map_err(StoreError::Scheme)?;
        fs::write(&self.path, data).map_err(StoreError::Io)
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_owned(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Default::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Decodes the JSON document under `key`, `None` when absent or malformed.
pub fn read_json<T: DeserializeOwned>(store: &dyn LocalStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::debug!(key, "stored value does not decode: {e}");
            None
        }
    }
}

/// Encodes `value` as JSON and stores it under `key`, replacing what was there.
pub fn write_json<T: Serialize + ?Sized>(
    store: &mut dyn LocalStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(StoreError::Scheme)?;
    store.set(key, raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut store = FileStore::open(&path).unwrap();
        assert_eq!(store.get(USER_KEY), None);
        write_json(&mut store, USER_KEY, &serde_json::json!({ "username": "alice" })).unwrap();
        store.set("scratch", "1".to_owned()).unwrap();
        store.remove("scratch").unwrap();

        let store = FileStore::open(&path).unwrap();
        let user: serde_json::Value = read_json(&store, USER_KEY).unwrap();
        assert_eq!(user["username"], "alice");
        assert_eq!(store.get("scratch"), None);
    }

    #[test]
    fn corrupt_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{ not json").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get(POSTS_KEY), None);
    }

    #[test]
    fn malformed_value_reads_as_none() {
        let mut store = MemoryStore::new();
        store.set(POSTS_KEY, "[{".to_owned()).unwrap();

        let posts: Option<Vec<serde_json::Value>> = read_json(&store, POSTS_KEY);
        assert!(posts.is_none());
    }
}
