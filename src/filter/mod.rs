mod chain;
mod geo;
mod types;

pub use chain::{evaluate, FilterChain, FilterDecision};
pub use geo::distance_meters;
pub use types::{
    FilterKind, LocationFilter, ParseFilterKindError, DEFAULT_DISTANCE_THRESHOLD,
    DEFAULT_TIME_INTERVAL,
};
