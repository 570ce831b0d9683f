mod error;
mod platform;
mod tracker;
mod types;

pub use error::TrackerError;
pub use platform::Platform;
pub use tracker::LocationTracker;
pub use types::{BackgroundTrackingMode, TrackingState};
