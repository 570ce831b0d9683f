use log::warn;
use tokio::sync::Mutex;

use crate::sample::Sample;
use crate::store::{Preferences, StorageResult};

/// Most recently uploaded sample, the reference every filter compares
/// against. Only moves forward in time.
pub struct LastAccepted {
    preferences: Preferences,
    lock: Mutex<()>,
}

impl LastAccepted {
    pub fn new(preferences: Preferences) -> Self {
        Self {
            preferences,
            lock: Mutex::new(()),
        }
    }

    /// An unreadable persisted value reads as absent.
    pub fn get(&self) -> Option<Sample> {
        match self.preferences.last_location() {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Failed to read last uploaded location, ignoring it: {}", e);
                None
            }
        }
    }

    /// Replaces the reference unless it already holds a later sample.
    /// Returns whether it moved.
    pub async fn advance(&self, sample: &Sample) -> StorageResult<bool> {
        let _guard = self.lock.lock().await;
        if let Some(current) = self.get() {
            if current.timestamp > sample.timestamp {
                return Ok(false);
            }
        }
        self.preferences.set_last_location(sample)?;
        Ok(true)
    }
}
