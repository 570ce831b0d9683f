use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::geo::distance_meters;
use crate::sample::Sample;
use crate::store::store_key;

/// Milliseconds that must pass between two uploads.
pub const DEFAULT_TIME_INTERVAL: i64 = 30_000;
/// Meters the device must move between two uploads.
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Time,
    Distance,
    Accuracy,
}

impl FilterKind {
    pub const ALL: [FilterKind; 3] = [FilterKind::Time, FilterKind::Distance, FilterKind::Accuracy];

    /// Preference key holding this kind's enabled flag.
    pub fn store_key(&self) -> &'static str {
        match self {
            FilterKind::Time => store_key::IS_TIME_FILTER_ENABLE,
            FilterKind::Distance => store_key::IS_DISTANCE_FILTER_ENABLE,
            FilterKind::Accuracy => store_key::IS_ACCURACY_FILTER_ENABLE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::Time => "time",
            FilterKind::Distance => "distance",
            FilterKind::Accuracy => "accuracy",
        }
    }

    pub fn default_filter(&self) -> LocationFilter {
        match self {
            FilterKind::Time => LocationFilter::Time {
                time_interval: DEFAULT_TIME_INTERVAL,
            },
            FilterKind::Distance => LocationFilter::Distance {
                distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            },
            FilterKind::Accuracy => LocationFilter::Accuracy,
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
#[error("unknown filter kind: {0}")]
pub struct ParseFilterKindError(String);

impl FromStr for FilterKind {
    type Err = ParseFilterKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "time" | "timelocationfilter" => Ok(FilterKind::Time),
            "distance" | "distancelocationfilter" => Ok(FilterKind::Distance),
            "accuracy" | "accuracylocationfilter" => Ok(FilterKind::Accuracy),
            _ => Err(ParseFilterKindError(s.to_string())),
        }
    }
}

/// An upload policy. A candidate sample is compared against the last
/// sample that was successfully uploaded; with no such reference every
/// policy accepts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LocationFilter {
    #[serde(rename = "TimeLocationFilter")]
    Time {
        #[serde(default = "default_time_interval")]
        time_interval: i64,
    },
    #[serde(rename = "DistanceLocationFilter")]
    Distance {
        #[serde(default = "default_distance_threshold")]
        distance_threshold: f64,
    },
    /// Movement must exceed the candidate's own reported error margin.
    #[serde(rename = "AccuracyLocationFilter")]
    Accuracy,
}

fn default_time_interval() -> i64 {
    DEFAULT_TIME_INTERVAL
}

fn default_distance_threshold() -> f64 {
    DEFAULT_DISTANCE_THRESHOLD
}

impl LocationFilter {
    pub fn kind(&self) -> FilterKind {
        match self {
            LocationFilter::Time { .. } => FilterKind::Time,
            LocationFilter::Distance { .. } => FilterKind::Distance,
            LocationFilter::Accuracy => FilterKind::Accuracy,
        }
    }

    /// Builds a filter of `kind` from a numeric parameter (milliseconds
    /// for time, meters for distance). Accuracy takes no parameter.
    pub fn with_parameter(kind: FilterKind, value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        match kind {
            FilterKind::Time => Some(LocationFilter::Time {
                time_interval: value.round() as i64,
            }),
            FilterKind::Distance => Some(LocationFilter::Distance {
                distance_threshold: value,
            }),
            FilterKind::Accuracy => None,
        }
    }

    pub fn should_upload(&self, candidate: &Sample, reference: Option<&Sample>) -> bool {
        let Some(reference) = reference else {
            return true;
        };

        match self {
            LocationFilter::Time { time_interval } => {
                candidate.timestamp.saturating_sub(reference.timestamp) > *time_interval
            }
            LocationFilter::Distance { distance_threshold } => {
                distance_meters(candidate, reference) > *distance_threshold
            }
            LocationFilter::Accuracy => {
                distance_meters(candidate, reference) > f64::from(candidate.accuracy)
            }
        }
    }
}

impl fmt::Display for LocationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationFilter::Time { time_interval } => write!(f, "time > {}ms", time_interval),
            LocationFilter::Distance { distance_threshold } => {
                write!(f, "distance > {}m", distance_threshold)
            }
            LocationFilter::Accuracy => f.write_str("distance > reported accuracy"),
        }
    }
}
