//! `StateStore` backends.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::contract::StateStore;
use crate::error::StateError;
use crate::models::StoreId;

/// Process-local store, used by tests and one-shot runs.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    values: Mutex<HashMap<(String, StoreId), String>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_values<T>(
        &self,
        f: impl FnOnce(&mut HashMap<(String, StoreId), String>) -> T,
    ) -> Result<T, StateError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| StateError::Backend("state mutex poisoned".into()))?;
        Ok(f(&mut values))
    }
}

impl StateStore for InMemoryStateStore {
    fn get(&self, name: &str, store: StoreId) -> Result<Option<String>, StateError> {
        self.with_values(|v| v.get(&(name.to_string(), store)).cloned())
    }

    fn set(&self, name: &str, store: StoreId, value: &str) -> Result<(), StateError> {
        self.with_values(|v| {
            v.insert((name.to_string(), store), value.to_string());
        })
    }

    fn delete(&self, name: &str, store: StoreId) -> Result<(), StateError> {
        self.with_values(|v| {
            v.remove(&(name.to_string(), store));
        })
    }
}

/// One JSON file per key at `<root>/<store>/<name>.json`.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str, store: StoreId) -> PathBuf {
        self.root.join(store.to_string()).join(format!("{name}.json"))
    }
}

impl StateStore for FileStateStore {
    fn get(&self, name: &str, store: StoreId) -> Result<Option<String>, StateError> {
        match fs::read_to_string(self.path(name, store)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StateError::io(name, e)),
        }
    }

    fn set(&self, name: &str, store: StoreId, value: &str) -> Result<(), StateError> {
        let path = self.path(name, store);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| StateError::io(name, e))?;
        }
        fs::write(&path, value).map_err(|e| StateError::io(name, e))
    }

    fn delete(&self, name: &str, store: StoreId) -> Result<(), StateError> {
        match fs::remove_file(self.path(name, store)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateError::io(name, e)),
        }
    }
}
