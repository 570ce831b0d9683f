use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::filter::{FilterKind, LocationFilter};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("tracker_name must not be empty")]
    MissingTrackerName,
    #[error("filter {0} is configured more than once")]
    DuplicateFilter(FilterKind),
    #[error("background_interval must be greater than zero")]
    ZeroBackgroundInterval,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    None,
    Error,
    #[default]
    Debug,
}

impl LogLevel {
    pub fn level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::None => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Debug => log::LevelFilter::Debug,
        }
    }
}

/// Requested trade-off between position quality and power use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    HighAccuracy,
    BalancedPowerAccuracy,
    LowPower,
    Passive,
}

/// Parameters handed to the location source when subscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationRequest {
    pub priority: Priority,
    pub interval: Duration,
    pub min_update_interval: Duration,
    pub max_update_delay: Duration,
    pub wait_for_accurate_location: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub tracker_name: String,
    #[serde(default = "default_filters")]
    pub location_filters: Vec<LocationFilter>,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub accuracy: Priority,
    /// Maximum batching delay of platform updates, in milliseconds.
    #[serde(default = "default_latency")]
    pub latency: u64,
    /// Desired update interval, in milliseconds.
    #[serde(default = "default_frequency")]
    pub frequency: u64,
    #[serde(default)]
    pub wait_for_accurate_location: bool,
    #[serde(default = "default_min_update_interval")]
    pub min_update_interval: u64,
    /// Period of the battery-saver background job, e.g. `15m`.
    #[serde(
        default = "default_background_interval",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub background_interval: Duration,
}

fn default_filters() -> Vec<LocationFilter> {
    vec![
        FilterKind::Time.default_filter(),
        FilterKind::Distance.default_filter(),
    ]
}

fn default_latency() -> u64 {
    1000
}

fn default_frequency() -> u64 {
    1500
}

fn default_min_update_interval() -> u64 {
    1000
}

fn default_background_interval() -> Duration {
    Duration::from_secs(15 * 60)
}

impl TrackerConfig {
    pub fn new(tracker_name: impl Into<String>) -> Self {
        TrackerConfig {
            tracker_name: tracker_name.into(),
            location_filters: default_filters(),
            log_level: LogLevel::default(),
            accuracy: Priority::default(),
            latency: default_latency(),
            frequency: default_frequency(),
            wait_for_accurate_location: false,
            min_update_interval: default_min_update_interval(),
            background_interval: default_background_interval(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: TrackerConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tracker_name.trim().is_empty() {
            return Err(ConfigError::MissingTrackerName);
        }
        for (i, filter) in self.location_filters.iter().enumerate() {
            if self.location_filters[..i]
                .iter()
                .any(|f| f.kind() == filter.kind())
            {
                return Err(ConfigError::DuplicateFilter(filter.kind()));
            }
        }
        if self.background_interval.is_zero() {
            return Err(ConfigError::ZeroBackgroundInterval);
        }
        Ok(())
    }

    pub fn location_request(&self) -> LocationRequest {
        LocationRequest {
            priority: self.accuracy,
            interval: Duration::from_millis(self.frequency),
            min_update_interval: Duration::from_millis(self.min_update_interval),
            max_update_delay: Duration::from_millis(self.latency),
            wait_for_accurate_location: self.wait_for_accurate_location,
        }
    }
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
}
