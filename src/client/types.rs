use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::sample::Sample;

/// One position report as sent to the service. `position` is
/// `[longitude, latitude]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicePositionUpdate {
    pub device_id: String,
    pub sample_time: DateTime<Utc>,
    pub position: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub position_properties: BTreeMap<String, String>,
}

impl DevicePositionUpdate {
    pub fn from_sample(device_id: &str, sample: &Sample) -> Self {
        DevicePositionUpdate {
            device_id: device_id.to_string(),
            sample_time: sample.sample_time(),
            position: [sample.longitude, sample.latitude],
            accuracy: Some(f64::from(sample.accuracy)),
            position_properties: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchUpdateRequest {
    pub tracker_name: String,
    pub updates: Vec<DevicePositionUpdate>,
}

impl BatchUpdateRequest {
    pub fn new(tracker_name: &str, device_id: &str, samples: &[Sample]) -> Self {
        BatchUpdateRequest {
            tracker_name: tracker_name.to_string(),
            updates: samples
                .iter()
                .map(|s| DevicePositionUpdate::from_sample(device_id, s))
                .collect(),
        }
    }
}

/// Per-update rejections reported alongside an accepted batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadError {
    pub device_id: String,
    pub sample_time: DateTime<Utc>,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadAck {
    #[serde(default)]
    pub errors: Vec<UploadError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEvaluateRequest {
    pub collection_name: String,
    pub updates: Vec<DevicePositionUpdate>,
}

impl BatchEvaluateRequest {
    pub fn new(collection_name: &str, device_id: &str, samples: &[Sample]) -> Self {
        BatchEvaluateRequest {
            collection_name: collection_name.to_string(),
            updates: samples
                .iter()
                .map(|s| DevicePositionUpdate::from_sample(device_id, s))
                .collect(),
        }
    }

    /// Tags every update with the caller's identity, given as
    /// `region:id`. An identity without a region is attached as-is.
    pub fn with_identity(mut self, identity_id: &str) -> Self {
        let mut properties = BTreeMap::new();
        match identity_id.split_once(':') {
            Some((region, id)) => {
                properties.insert("region".to_string(), region.to_string());
                properties.insert("id".to_string(), id.to_string());
            }
            None => {
                properties.insert("id".to_string(), identity_id.to_string());
            }
        }
        for update in &mut self.updates {
            update.position_properties = properties.clone();
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceEvaluationError {
    pub device_id: String,
    pub sample_time: DateTime<Utc>,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeofenceEvaluation {
    #[serde(default)]
    pub errors: Vec<GeofenceEvaluationError>,
}
