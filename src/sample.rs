use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub type SampleId = u64;

/// Accuracy recorded when the platform cannot report one.
pub const DEFAULT_ACCURACY: f32 = 0.0;

/// A raw position observation as delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f32>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
            accuracy: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f32) -> Self {
        self.accuracy = Some(accuracy);
        self
    }
}

/// One queued position. `id` is zero until the sample store assigns one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(default)]
    pub id: SampleId,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: i64,
    #[serde(default)]
    pub accuracy: f32,
}

impl Sample {
    pub fn new(latitude: f64, longitude: f64, timestamp: i64, accuracy: f32) -> Self {
        Self {
            id: 0,
            latitude,
            longitude,
            timestamp,
            accuracy: sanitize_accuracy(Some(accuracy)),
        }
    }

    pub fn sample_time(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl From<&Location> for Sample {
    fn from(location: &Location) -> Self {
        Sample {
            id: 0,
            latitude: location.latitude,
            longitude: location.longitude,
            timestamp: location.timestamp,
            accuracy: sanitize_accuracy(location.accuracy),
        }
    }
}

fn sanitize_accuracy(accuracy: Option<f32>) -> f32 {
    match accuracy {
        Some(a) if a.is_finite() && a >= 0.0 => a,
        _ => DEFAULT_ACCURACY,
    }
}
