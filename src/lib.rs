pub mod callback;
pub mod client;
pub mod config;
pub mod credentials;
pub mod data_dir;
pub mod device;
pub mod filter;
pub mod sample;
pub mod source;
pub mod store;
pub mod tracker;
pub mod upload;

pub use callback::LocationTrackingCallback;
pub use config::{ConfigError, LogLevel, TrackerConfig};
pub use data_dir::DataDir;
pub use filter::{FilterKind, LocationFilter};
pub use sample::{Location, Sample, SampleId};
pub use tracker::{BackgroundTrackingMode, LocationTracker, Platform, TrackerError, TrackingState};
pub use upload::CycleReport;
