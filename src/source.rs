use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::LocationRequest;
use crate::sample::Location;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    Locations(Vec<Location>),
    Availability(bool),
}

pub type SubscriptionId = u64;

pub struct Subscription {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<LocationEvent>,
}

/// Platform position provider.
#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn subscribe(&self, request: &LocationRequest) -> Result<Subscription, SourceError>;

    async fn unsubscribe(&self, id: SubscriptionId);

    /// One-shot fix, `None` when no position can be determined right now.
    async fn current_location(&self) -> Result<Option<Location>, SourceError>;
}

#[derive(Default)]
struct ChannelState {
    next_id: SubscriptionId,
    subscribers: HashMap<SubscriptionId, mpsc::UnboundedSender<LocationEvent>>,
    current: Option<Location>,
}

/// Location source fed by the host: positions pushed in are fanned out to
/// every live subscription.
#[derive(Default)]
pub struct ChannelLocationSource {
    state: Mutex<ChannelState>,
}

impl ChannelLocationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers a batch to all subscribers and remembers the newest fix
    /// for `current_location`. Returns the number of subscribers reached.
    pub fn push_locations(&self, locations: Vec<Location>) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(newest) = locations.iter().max_by_key(|l| l.timestamp) {
            state.current = Some(*newest);
        }
        broadcast(&mut state, LocationEvent::Locations(locations))
    }

    pub fn push_availability(&self, available: bool) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        broadcast(&mut state, LocationEvent::Availability(available))
    }

    pub fn set_current(&self, location: Option<Location>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.current = location;
    }

    pub fn subscriber_count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.subscribers.len()
    }
}

fn broadcast(state: &mut ChannelState, event: LocationEvent) -> usize {
    state
        .subscribers
        .retain(|_, tx| tx.send(event.clone()).is_ok());
    state.subscribers.len()
}

#[async_trait]
impl LocationSource for ChannelLocationSource {
    async fn subscribe(&self, request: &LocationRequest) -> Result<Subscription, SourceError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.next_id += 1;
        let id = state.next_id;
        state.subscribers.insert(id, tx);
        debug!("Subscription {} opened ({:?})", id, request.priority);
        Ok(Subscription { id, events: rx })
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.subscribers.remove(&id).is_some() {
            debug!("Subscription {} closed", id);
        }
    }

    async fn current_location(&self) -> Result<Option<Location>, SourceError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state.current)
    }
}
