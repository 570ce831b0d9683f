use log::warn;
use std::sync::Arc;

use super::error::StorageResult;
use super::kv::KeyValueStore;
use crate::config::TrackerConfig;
use crate::filter::FilterKind;
use crate::sample::Sample;
use crate::tracker::TrackingState;

pub mod store_key {
    pub const CLIENT_CONFIG: &str = "client_config";
    pub const DEVICE_ID: &str = "device_id";
    pub const LAST_LOCATION: &str = "last_location";
    pub const TRACKING_IN_PROGRESS: &str = "tracking_in_progress";
    pub const BG_TRACKING_IN_PROGRESS: &str = "bg_tracking_in_progress";
    pub const IS_TIME_FILTER_ENABLE: &str = "is_time_filter_enable";
    pub const IS_DISTANCE_FILTER_ENABLE: &str = "is_distance_filter_enable";
    pub const IS_ACCURACY_FILTER_ENABLE: &str = "is_accuracy_filter_enable";
}

/// Typed access to the tracker's persisted settings.
#[derive(Clone)]
pub struct Preferences {
    kv: Arc<dyn KeyValueStore>,
}

impl Preferences {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    /// Missing or unparsable flags read as `false`.
    pub fn flag(&self, key: &str) -> StorageResult<bool> {
        let value = self.kv.get(key)?;
        Ok(match value.as_deref() {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Ignoring non-boolean value for {}: {:?}", key, raw);
                false
            }),
            None => false,
        })
    }

    pub fn set_flag(&self, key: &str, value: bool) -> StorageResult<()> {
        self.kv.put(key, &value.to_string())
    }

    pub fn filter_enabled(&self, kind: FilterKind) -> StorageResult<bool> {
        self.flag(kind.store_key())
    }

    pub fn set_filter_enabled(&self, kind: FilterKind, enabled: bool) -> StorageResult<()> {
        self.set_flag(kind.store_key(), enabled)
    }

    pub fn tracking_state(&self) -> StorageResult<TrackingState> {
        Ok(TrackingState {
            foreground: self.flag(store_key::TRACKING_IN_PROGRESS)?,
            background: self.flag(store_key::BG_TRACKING_IN_PROGRESS)?,
        })
    }

    pub fn set_foreground_tracking(&self, active: bool) -> StorageResult<()> {
        self.set_flag(store_key::TRACKING_IN_PROGRESS, active)
    }

    pub fn set_background_tracking(&self, active: bool) -> StorageResult<()> {
        self.set_flag(store_key::BG_TRACKING_IN_PROGRESS, active)
    }

    pub fn last_location(&self) -> StorageResult<Option<Sample>> {
        match self.kv.get(store_key::LAST_LOCATION)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_last_location(&self, sample: &Sample) -> StorageResult<()> {
        self.kv
            .put(store_key::LAST_LOCATION, &serde_json::to_string(sample)?)
    }

    pub fn config(&self) -> StorageResult<Option<TrackerConfig>> {
        match self.kv.get(store_key::CLIENT_CONFIG)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn save_config(&self, config: &TrackerConfig) -> StorageResult<()> {
        self.kv
            .put(store_key::CLIENT_CONFIG, &serde_json::to_string(config)?)
    }
}
