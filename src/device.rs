use log::info;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::store::{store_key, KeyValueStore, StorageResult};

/// Per-install random identifier reported with every position.
pub struct DeviceIdentity {
    kv: Arc<dyn KeyValueStore>,
    init: Mutex<()>,
}

impl DeviceIdentity {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            init: Mutex::new(()),
        }
    }

    /// Returns the persisted id, generating and persisting one on first use.
    pub async fn get_id(&self) -> StorageResult<String> {
        if let Some(id) = self.kv.get(store_key::DEVICE_ID)? {
            return Ok(id);
        }

        let _guard = self.init.lock().await;
        if let Some(id) = self.kv.get(store_key::DEVICE_ID)? {
            return Ok(id);
        }

        let id = uuid::Uuid::new_v4().to_string();
        self.kv.put(store_key::DEVICE_ID, &id)?;
        info!("Generated device id {}", id);
        Ok(id)
    }

    /// The persisted id, without generating one.
    pub fn current(&self) -> StorageResult<Option<String>> {
        self.kv.get(store_key::DEVICE_ID)
    }

    /// Forgets the current id; the next `get_id` generates a fresh one.
    pub async fn reset(&self) -> StorageResult<()> {
        let _guard = self.init.lock().await;
        self.kv.remove(store_key::DEVICE_ID)
    }
}
