// Persistent key-value storage for the reloader's timestamps
//
// The host owns the real store; this module defines the narrow interface the
// controller needs plus an in-memory store and a JSON file store.

use crate::models::{PersistedTimestamps, keys};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Synchronous, process-durable string store
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.write().map_err(|_| StorageError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.write().map_err(|_| StorageError::Poisoned)?;
        values.remove(key);
        Ok(())
    }
}

/// A store backed by a JSON object on disk, rewritten atomically on every change
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store, starting empty if the file is missing or unreadable
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str(&content) {
                Ok(values) => values,
                Err(e) => {
                    warn!("Store {} is malformed, starting empty: {}", path.display(), e);
                    BTreeMap::new()
                },
            }
        } else {
            BTreeMap::new()
        };

        debug!("Opened store {} with {} keys", path.display(), values.len());
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let temp_path = self.path.with_extension("tmp");
        let content = serde_json::to_string_pretty(values)?;

        // Atomic write
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.write().map_err(|_| StorageError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.write().map_err(|_| StorageError::Poisoned)?;
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}

/// Timestamps are stored as milliseconds since the Unix epoch
pub fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.timestamp_millis().to_string()
}

pub fn decode_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = raw.trim().parse().ok()?;
    DateTime::from_timestamp_millis(millis)
}

/// Read a timestamp, treating anything malformed as absent
pub fn read_timestamp(store: &dyn KeyValueStore, key: &str) -> Option<DateTime<Utc>> {
    let raw = store.get(key)?;
    let parsed = decode_timestamp(&raw);
    if parsed.is_none() {
        debug!("Ignoring malformed timestamp {}={:?}", key, raw);
    }
    parsed
}

pub fn write_timestamp(
    store: &dyn KeyValueStore,
    key: &str,
    at: DateTime<Utc>,
) -> Result<(), StorageError> {
    store.set(key, &encode_timestamp(at))
}

pub fn load_timestamps(store: &dyn KeyValueStore) -> PersistedTimestamps {
    PersistedTimestamps {
        was_refreshed_at: read_timestamp(store, keys::WAS_REFRESHED),
        last_start_at: read_timestamp(store, keys::LAST_START),
        last_pause_at: read_timestamp(store, keys::LAST_PAUSE),
    }
}
