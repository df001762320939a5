//! Key-value persistence for sticky provisioning parameters

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::errors::FleetError;
use crate::filesys::file::File;

/// Load/save collaborator for small JSON documents keyed by name
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Value>, FleetError>;
    async fn save(&self, key: &str, value: Value) -> Result<(), FleetError>;
}

/// Store backed by one owner-only JSON file
pub struct JsonFileStore {
    file: File,
    // serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(file: File) -> Self {
        Self {
            file,
            write_lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<BTreeMap<String, Value>, FleetError> {
        if !self.file.exists().await {
            return Ok(BTreeMap::new());
        }
        self.file.read_json().await
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn load(&self, key: &str) -> Result<Option<Value>, FleetError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn save(&self, key: &str, value: Value) -> Result<(), FleetError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_all().await?;
        entries.insert(key.to_string(), value);
        self.file.write_json(&entries).await?;
        self.file.set_permissions_600().await
    }
}

/// Process-local store, used when nothing should touch disk
#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Value>, FleetError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: Value) -> Result<(), FleetError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }
}
