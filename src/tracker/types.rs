use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted tracking flags. Foreground and background sessions are
/// independent; both clear means stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackingState {
    pub foreground: bool,
    pub background: bool,
}

impl TrackingState {
    pub fn is_stopped(&self) -> bool {
        !self.foreground && !self.background
    }
}

impl fmt::Display for TrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.foreground, self.background) {
            (false, false) => write!(f, "stopped"),
            (true, false) => write!(f, "foreground"),
            (false, true) => write!(f, "background"),
            (true, true) => write!(f, "foreground+background"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundTrackingMode {
    /// Keeps a live subscription, same as foreground tracking.
    #[default]
    ActiveTracking,
    /// Periodic one-shot fetch every `background_interval`.
    BatterySaverTracking,
}
