#![allow(dead_code)]

use async_trait::async_trait;
use location_tracker::client::{
    BatchEvaluateRequest, BatchUpdateRequest, GeofenceEvaluation, TransmitClient, TransmitError,
    UploadAck,
};
use location_tracker::credentials::{CredentialError, CredentialProvider};
use location_tracker::source::ChannelLocationSource;
use location_tracker::store::{MemoryKeyValueStore, SampleStore};
use location_tracker::{
    Location, LocationTracker, LocationTrackingCallback, Platform, Sample, TrackerConfig,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

/// Records every request; fails the next `fail_next` uploads. When paused,
/// each upload waits for a permit from `release`.
pub struct MockClient {
    pub requests: Mutex<Vec<BatchUpdateRequest>>,
    pub evaluations: Mutex<Vec<BatchEvaluateRequest>>,
    pub attempts: AtomicUsize,
    pub fail_next: AtomicUsize,
    pub last_known: Mutex<Option<Location>>,
    pub paused: AtomicBool,
    pub release: Semaphore,
}

impl MockClient {
    pub fn new() -> Self {
        MockClient {
            requests: Mutex::new(Vec::new()),
            evaluations: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_next: AtomicUsize::new(0),
            last_known: Mutex::new(None),
            paused: AtomicBool::new(false),
            release: Semaphore::new(0),
        }
    }

    pub fn fail_always(&self) {
        self.fail_next.store(usize::MAX, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Timestamps of each successful batch, in call order.
    pub fn batches(&self) -> Vec<Vec<i64>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| {
                r.updates
                    .iter()
                    .map(|u| u.sample_time.timestamp_millis())
                    .collect()
            })
            .collect()
    }

    pub fn uploaded_count(&self) -> usize {
        self.batches().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl TransmitClient for MockClient {
    async fn upload_batch(&self, request: &BatchUpdateRequest) -> Result<UploadAck, TransmitError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.paused.load(Ordering::SeqCst) {
            self.release.acquire().await.unwrap().forget();
        }

        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n == 0 {
                    None
                } else if n == usize::MAX {
                    Some(n)
                } else {
                    Some(n - 1)
                }
            })
            .is_ok();
        if failing {
            return Err(TransmitError::Network("connection reset".into()));
        }

        self.requests.lock().unwrap().push(request.clone());
        Ok(UploadAck::default())
    }

    async fn fetch_last_known(
        &self,
        _tracker_name: &str,
        device_id: &str,
    ) -> Result<Location, TransmitError> {
        let last_known = *self.last_known.lock().unwrap();
        last_known.ok_or_else(|| TransmitError::NotFound(device_id.to_string()))
    }

    async fn evaluate_geofences(
        &self,
        request: &BatchEvaluateRequest,
    ) -> Result<GeofenceEvaluation, TransmitError> {
        self.evaluations.lock().unwrap().push(request.clone());
        Ok(GeofenceEvaluation::default())
    }
}

pub struct MockCredentials {
    pub client: Arc<MockClient>,
    pub valid: AtomicBool,
    /// Reports invalid on every check, so each remote call refreshes.
    pub always_expired: bool,
    pub refreshes: AtomicUsize,
}

impl MockCredentials {
    pub fn new(client: Arc<MockClient>) -> Self {
        Self {
            client,
            valid: AtomicBool::new(true),
            always_expired: false,
            refreshes: AtomicUsize::new(0),
        }
    }

    pub fn always_expired(client: Arc<MockClient>) -> Self {
        Self {
            always_expired: true,
            ..Self::new(client)
        }
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for MockCredentials {
    fn is_valid(&self) -> bool {
        !self.always_expired && self.valid.load(Ordering::SeqCst)
    }

    async fn refresh(&self) -> Result<(), CredentialError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.valid.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn client(&self) -> Option<Arc<dyn TransmitClient>> {
        Some(self.client.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Received(i64),
    Started(Vec<i64>),
    Uploaded(Vec<i64>),
    Skipped(i64),
    Availability(bool),
}

#[derive(Default)]
pub struct RecordingCallback {
    pub events: Mutex<Vec<Event>>,
}

impl RecordingCallback {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

fn timestamps(batch: &[Sample]) -> Vec<i64> {
    batch.iter().map(|s| s.timestamp).collect()
}

impl LocationTrackingCallback for RecordingCallback {
    fn on_location_received(&self, sample: &Sample) {
        self.push(Event::Received(sample.timestamp));
    }

    fn on_upload_started(&self, batch: &[Sample]) {
        self.push(Event::Started(timestamps(batch)));
    }

    fn on_uploaded(&self, batch: &[Sample]) {
        self.push(Event::Uploaded(timestamps(batch)));
    }

    fn on_upload_skipped(&self, sample: &Sample) {
        self.push(Event::Skipped(sample.timestamp));
    }

    fn on_location_availability_changed(&self, available: bool) {
        self.push(Event::Availability(available));
    }
}

pub struct Harness {
    pub source: Arc<ChannelLocationSource>,
    pub client: Arc<MockClient>,
    pub credentials: Arc<MockCredentials>,
    pub preferences: Arc<MemoryKeyValueStore>,
    pub device_store: Arc<MemoryKeyValueStore>,
    pub samples: Arc<SampleStore>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let client = Arc::new(MockClient::new());
        Self::with_credentials(Arc::new(MockCredentials::new(client)))
    }

    pub fn with_credentials(credentials: Arc<MockCredentials>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let samples = Arc::new(SampleStore::open(dir.path().join("samples")).unwrap());
        Harness {
            source: Arc::new(ChannelLocationSource::new()),
            client: credentials.client.clone(),
            credentials,
            preferences: Arc::new(MemoryKeyValueStore::new()),
            device_store: Arc::new(MemoryKeyValueStore::new()),
            samples,
            dir,
        }
    }

    pub fn platform(&self) -> Platform {
        Platform {
            source: self.source.clone(),
            credentials: Some(self.credentials.clone()),
            preferences: self.preferences.clone(),
            device_store: self.device_store.clone(),
            samples: self.samples.clone(),
        }
    }

    /// Tracker named `fleet` with default filters, all disabled.
    pub fn tracker(&self) -> LocationTracker {
        self.tracker_with(TrackerConfig::new("fleet"))
    }

    pub fn tracker_with(&self, config: TrackerConfig) -> LocationTracker {
        LocationTracker::new(config, self.platform()).unwrap()
    }
}

pub fn location(latitude: f64, longitude: f64, timestamp: i64) -> Location {
    Location::new(latitude, longitude, timestamp)
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
