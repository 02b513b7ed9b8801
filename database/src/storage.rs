//! Local key-value storage
//!
//! JSON values keyed by string, held in memory and optionally mirrored to a
//! file after every write. Two instances back the application: a persistent
//! one (`user`, `isAuthenticated`, `auditBackup`) and a session one
//! (`sessionId`).

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StorageResult;

pub const USER_KEY: &str = "user";
pub const IS_AUTHENTICATED_KEY: &str = "isAuthenticated";
pub const AUDIT_BACKUP_KEY: &str = "auditBackup";
pub const SESSION_ID_KEY: &str = "sessionId";

#[derive(Debug, Default)]
pub struct LocalStorage {
    values: RwLock<HashMap<String, Value>>,
    path: Option<PathBuf>,
}

impl LocalStorage {
    /// Memory-only storage
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File-backed storage; an existing file is loaded, a missing one is created on first write
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            HashMap::new()
        };
        debug!("Opened local storage at {} with {} keys", path.display(), values.len());

        Ok(Self {
            values: RwLock::new(values),
            path: Some(path),
        })
    }

    /// Typed read; missing keys and undecodable values read as `None`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let values = self.values.read();
        let value = values.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!("Error reading {} from local storage: {}", key, err);
                None
            }
        }
    }

    pub fn get_raw(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let encoded = serde_json::to_value(value)?;
        self.values.write().insert(key.to_string(), encoded);
        self.persist()
    }

    pub fn remove(&self, key: &str) -> StorageResult<bool> {
        let removed = self.values.write().remove(key).is_some();
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    /// Appends to the JSON array stored under `key`, keeping only the last `cap` items.
    /// Returns the resulting array length.
    pub fn append_capped<T: Serialize>(&self, key: &str, item: &T, cap: usize) -> StorageResult<usize> {
        let encoded = serde_json::to_value(item)?;
        let len = {
            let mut values = self.values.write();
            let slot = values
                .entry(key.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            match slot {
                Value::Array(list) => {
                    list.push(encoded);
                    if list.len() > cap {
                        let excess = list.len() - cap;
                        list.drain(..excess);
                    }
                    list.len()
                }
                _ => 0,
            }
        };
        self.persist()?;
        Ok(len)
    }

    pub fn clear(&self) -> StorageResult<()> {
        self.values.write().clear();
        self.persist()
    }

    fn persist(&self) -> StorageResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot = serde_json::to_string_pretty(&*self.values.read())?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, snapshot)?;
        Ok(())
    }
}
