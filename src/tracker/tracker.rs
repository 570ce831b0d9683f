use log::{debug, error, info, warn};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::error::TrackerError;
use super::platform::Platform;
use super::types::{BackgroundTrackingMode, TrackingState};
use crate::callback::LocationTrackingCallback;
use crate::client::{BatchEvaluateRequest, GeofenceEvaluation};
use crate::config::TrackerConfig;
use crate::credentials::CredentialGate;
use crate::device::DeviceIdentity;
use crate::filter::{FilterChain, FilterKind, LocationFilter};
use crate::sample::{Location, Sample};
use crate::source::{LocationEvent, LocationSource, SubscriptionId};
use crate::store::{Preferences, SampleStore, StorageResult};
use crate::upload::{CycleReport, LastAccepted, UploadCoordinator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Session {
    Foreground,
    Background,
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Session::Foreground => f.write_str("foreground"),
            Session::Background => f.write_str("background"),
        }
    }
}

struct WorkerHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
    subscription: Option<SubscriptionId>,
}

impl WorkerHandle {
    /// Upload cycles already spawned by the worker keep running.
    async fn shutdown(self, source: &dyn LocationSource) {
        let _ = self.stop_tx.send(());
        if let Some(id) = self.subscription {
            source.unsubscribe(id).await;
        }
        if let Err(e) = self.join.await {
            error!("Tracking worker ended abnormally: {}", e);
        }
    }
}

struct Shared {
    config: RwLock<TrackerConfig>,
    preferences: Preferences,
    samples: Arc<SampleStore>,
    filters: Arc<FilterChain>,
    last_accepted: Arc<LastAccepted>,
    coordinator: UploadCoordinator,
    credentials: CredentialGate,
    device: Arc<DeviceIdentity>,
    source: Arc<dyn LocationSource>,
    callback: RwLock<Option<Arc<dyn LocationTrackingCallback>>>,
}

impl Shared {
    fn config(&self) -> TrackerConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn callback(&self) -> Option<Arc<dyn LocationTrackingCallback>> {
        self.callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_callback(&self, callback: Arc<dyn LocationTrackingCallback>) {
        *self.callback.write().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn set_session_flag(&self, session: Session, active: bool) -> StorageResult<()> {
        match session {
            Session::Foreground => self.preferences.set_foreground_tracking(active),
            Session::Background => self.preferences.set_background_tracking(active),
        }
    }

    fn is_active(&self, session: Session) -> bool {
        match self.preferences.tracking_state() {
            Ok(state) => match session {
                Session::Foreground => state.foreground,
                Session::Background => state.background,
            },
            Err(e) => {
                warn!("Failed to read tracking state: {}", e);
                false
            }
        }
    }

    /// Rewrites the cached configuration with the current filter list.
    fn cache_config(&self) -> StorageResult<()> {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        config.location_filters = self.filters.filters();
        self.preferences.save_config(&config)
    }

    async fn record(
        &self,
        locations: &[Location],
        callback: Option<Arc<dyn LocationTrackingCallback>>,
    ) -> Result<CycleReport, TrackerError> {
        for location in locations {
            let mut sample = Sample::from(location);
            sample.id = self.samples.append(&sample)?;
            if let Some(cb) = &callback {
                cb.on_location_received(&sample);
            }
        }
        self.coordinator.run_upload_cycle(callback.as_deref()).await
    }

    fn spawn_record(
        self: &Arc<Self>,
        locations: Vec<Location>,
        callback: Option<Arc<dyn LocationTrackingCallback>>,
    ) {
        let shared = self.clone();
        tokio::spawn(async move {
            match shared.record(&locations, callback).await {
                Ok(report) => debug!("Upload cycle finished: {:?}", report),
                Err(e) => error!("Failed to process {} locations: {}", locations.len(), e),
            }
        });
    }

    async fn fetch_current(
        self: &Arc<Self>,
        callback: Option<Arc<dyn LocationTrackingCallback>>,
    ) -> Result<Option<Location>, TrackerError> {
        let location = self.source.current_location().await?;
        if let Some(location) = location {
            self.spawn_record(vec![location], callback);
        }
        Ok(location)
    }
}

async fn run_subscription_loop(
    shared: Arc<Shared>,
    session: Session,
    mut events: mpsc::UnboundedReceiver<LocationEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = &mut stop_rx => break,
        };

        match event {
            Some(LocationEvent::Locations(locations)) => {
                if !shared.is_active(session) {
                    debug!(
                        "Dropping {} locations delivered to inactive {} session",
                        locations.len(),
                        session
                    );
                    continue;
                }
                shared.spawn_record(locations, shared.callback());
            }
            Some(LocationEvent::Availability(available)) => {
                debug!("Location availability changed: {}", available);
                if let Some(cb) = shared.callback() {
                    cb.on_location_availability_changed(available);
                }
            }
            None => {
                warn!("Location source closed the {} subscription", session);
                break;
            }
        }
    }
}

async fn run_periodic_loop(
    shared: Arc<Shared>,
    period: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut stop_rx => break,
        }

        if !shared.is_active(Session::Background) {
            continue;
        }
        match shared.fetch_current(shared.callback()).await {
            Ok(Some(location)) => debug!("Periodic fix at {}", location.timestamp),
            Ok(None) => debug!("No location available for periodic fetch"),
            Err(e) => warn!("Periodic location fetch failed: {}", e),
        }
    }
}

/// Owns the capture sessions and wires captured locations into the
/// durable queue and the upload coordinator. Cheap to clone.
#[derive(Clone)]
pub struct LocationTracker {
    shared: Arc<Shared>,
    foreground: Arc<Mutex<Option<WorkerHandle>>>,
    background: Arc<Mutex<Option<WorkerHandle>>>,
}

impl LocationTracker {
    /// Validates `config` and caches it so later launches can use
    /// [`LocationTracker::from_preferences`].
    pub fn new(config: TrackerConfig, platform: Platform) -> Result<Self, TrackerError> {
        config.validate()?;
        let preferences = Preferences::new(platform.preferences.clone());
        preferences.save_config(&config)?;
        info!("Tracker {} configured", config.tracker_name);
        Ok(Self::assemble(config, preferences, platform))
    }

    pub fn from_preferences(platform: Platform) -> Result<Self, TrackerError> {
        let preferences = Preferences::new(platform.preferences.clone());
        let config = preferences
            .config()?
            .ok_or(TrackerError::ConfigurationMissing)?;
        config.validate()?;
        debug!("Tracker {} restored from preferences", config.tracker_name);
        Ok(Self::assemble(config, preferences, platform))
    }

    fn assemble(config: TrackerConfig, preferences: Preferences, platform: Platform) -> Self {
        let filters = Arc::new(FilterChain::new(
            config.location_filters.clone(),
            preferences.clone(),
        ));
        let last_accepted = Arc::new(LastAccepted::new(preferences.clone()));
        let credentials = CredentialGate::new(platform.credentials);
        let device = Arc::new(DeviceIdentity::new(platform.device_store));
        let coordinator = UploadCoordinator::new(
            config.tracker_name.clone(),
            platform.samples.clone(),
            filters.clone(),
            last_accepted.clone(),
            credentials.clone(),
            device.clone(),
        );

        LocationTracker {
            shared: Arc::new(Shared {
                config: RwLock::new(config),
                preferences,
                samples: platform.samples,
                filters,
                last_accepted,
                coordinator,
                credentials,
                device,
                source: platform.source,
                callback: RwLock::new(None),
            }),
            foreground: Arc::new(Mutex::new(None)),
            background: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> TrackerConfig {
        self.shared.config()
    }

    pub fn tracker_name(&self) -> String {
        self.shared.coordinator.tracker_name().to_string()
    }

    pub async fn start(
        &self,
        callback: Arc<dyn LocationTrackingCallback>,
    ) -> Result<(), TrackerError> {
        let mut worker = self.foreground.lock().await;
        if worker.is_some() {
            return Err(TrackerError::AlreadyRunning);
        }
        *worker = Some(self.subscribe(Session::Foreground, Some(callback)).await?);
        info!("Foreground tracking started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), TrackerError> {
        let mut worker = self.foreground.lock().await;
        self.shared.set_session_flag(Session::Foreground, false)?;
        if let Some(worker) = worker.take() {
            worker.shutdown(self.shared.source.as_ref()).await;
            info!("Foreground tracking stopped");
        }
        Ok(())
    }

    pub async fn start_background(&self, mode: BackgroundTrackingMode) -> Result<(), TrackerError> {
        let mut worker = self.background.lock().await;
        if worker.is_some() {
            return Err(TrackerError::AlreadyRunning);
        }

        let handle = match mode {
            BackgroundTrackingMode::ActiveTracking => {
                self.subscribe(Session::Background, None).await?
            }
            BackgroundTrackingMode::BatterySaverTracking => {
                self.shared.set_session_flag(Session::Background, true)?;
                let period = self.shared.config().background_interval;
                let (stop_tx, stop_rx) = oneshot::channel();
                let join = tokio::spawn(run_periodic_loop(self.shared.clone(), period, stop_rx));
                WorkerHandle {
                    stop_tx,
                    join,
                    subscription: None,
                }
            }
        };
        *worker = Some(handle);
        info!("Background tracking started ({:?})", mode);
        Ok(())
    }

    pub async fn stop_background(&self) -> Result<(), TrackerError> {
        let mut worker = self.background.lock().await;
        self.shared.set_session_flag(Session::Background, false)?;
        if let Some(worker) = worker.take() {
            worker.shutdown(self.shared.source.as_ref()).await;
            info!("Background tracking stopped");
        }
        Ok(())
    }

    /// Installs `callback` only once the source has accepted the subscription.
    async fn subscribe(
        &self,
        session: Session,
        callback: Option<Arc<dyn LocationTrackingCallback>>,
    ) -> Result<WorkerHandle, TrackerError> {
        self.shared.set_session_flag(session, true)?;
        let request = self.shared.config().location_request();
        let subscription = match self.shared.source.subscribe(&request).await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.shared.set_session_flag(session, false)?;
                return Err(e.into());
            }
        };
        debug!("Subscribed {} session as {}", session, subscription.id);
        if let Some(callback) = callback {
            self.shared.set_callback(callback);
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(run_subscription_loop(
            self.shared.clone(),
            session,
            subscription.events,
            stop_rx,
        ));
        Ok(WorkerHandle {
            stop_tx,
            join,
            subscription: Some(subscription.id),
        })
    }

    pub fn tracking_state(&self) -> Result<TrackingState, TrackerError> {
        Ok(self.shared.preferences.tracking_state()?)
    }

    pub fn is_tracking_in_foreground(&self) -> bool {
        self.shared.is_active(Session::Foreground)
    }

    pub fn is_tracking_in_background(&self) -> bool {
        self.shared.is_active(Session::Background)
    }

    /// Queues `locations` as if the source had delivered them and runs one
    /// upload cycle with the registered callback.
    pub async fn record_locations(
        &self,
        locations: &[Location],
    ) -> Result<CycleReport, TrackerError> {
        self.shared.record(locations, self.shared.callback()).await
    }

    /// One-shot fix. A returned location is queued and uploaded in the
    /// background.
    pub async fn get_device_location(
        &self,
        callback: Option<Arc<dyn LocationTrackingCallback>>,
    ) -> Result<Option<Location>, TrackerError> {
        self.shared.fetch_current(callback).await
    }

    pub async fn upload_location_updates(
        &self,
        callback: Option<&dyn LocationTrackingCallback>,
    ) -> Result<CycleReport, TrackerError> {
        self.shared.coordinator.run_upload_cycle(callback).await
    }

    pub fn queued_samples(&self) -> Result<Vec<Sample>, TrackerError> {
        Ok(self.shared.samples.list_all_ascending_by_time()?)
    }

    pub fn last_uploaded(&self) -> Option<Sample> {
        self.shared.last_accepted.get()
    }

    pub fn filters(&self) -> Vec<LocationFilter> {
        self.shared.filters.filters()
    }

    pub fn filter(&self, kind: FilterKind) -> Option<LocationFilter> {
        self.shared.filters.get(kind)
    }

    pub fn is_filter_enabled(&self, kind: FilterKind) -> bool {
        self.shared.filters.is_enabled(kind)
    }

    pub fn enable_filter(&self, kind: FilterKind) -> Result<(), TrackerError> {
        if self.shared.filters.enable(kind)? {
            self.shared.cache_config()?;
        }
        info!("{} filter enabled", kind);
        Ok(())
    }

    pub fn disable_filter(&self, kind: FilterKind) -> Result<(), TrackerError> {
        self.shared.filters.disable(kind)?;
        info!("{} filter disabled", kind);
        Ok(())
    }

    /// Replaces the same-kind filter's parameters, adding the filter if it
    /// was not configured. Does not change its enabled flag.
    pub fn update_filter(&self, filter: LocationFilter) -> Result<(), TrackerError> {
        self.shared.filters.upsert(filter);
        self.shared.cache_config()?;
        info!("Filter updated: {}", filter);
        Ok(())
    }

    pub fn update_filter_parameter(&self, kind: FilterKind, value: f64) -> Result<(), TrackerError> {
        let filter = LocationFilter::with_parameter(kind, value)
            .ok_or(TrackerError::InvalidFilterParameter(kind, value))?;
        self.update_filter(filter)
    }

    pub async fn device_id(&self) -> Result<String, TrackerError> {
        Ok(self.shared.device.get_id().await?)
    }

    /// Persisted device id, `None` until one has been generated.
    pub fn current_device_id(&self) -> Result<Option<String>, TrackerError> {
        Ok(self.shared.device.current()?)
    }

    pub async fn reset_device_id(&self) -> Result<(), TrackerError> {
        Ok(self.shared.device.reset().await?)
    }

    /// Position the service last recorded for this device, `None` when it
    /// holds none.
    pub async fn get_tracker_device_location(&self) -> Result<Option<Location>, TrackerError> {
        let client = self.shared.credentials.authorized_client().await?;
        let device_id = self.shared.device.get_id().await?;
        let tracker_name = self.tracker_name();

        match client.fetch_last_known(&tracker_name, &device_id).await {
            Ok(location) => Ok(Some(location)),
            Err(e) if e.is_not_found() => {
                info!("No position recorded for device {} on {}", device_id, tracker_name);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Evaluates `samples` against a geofence collection. `identity_id`
    /// (`region:id`) is attached to every update when given.
    pub async fn batch_evaluate_geofences(
        &self,
        collection_name: &str,
        device_id: &str,
        samples: &[Sample],
        identity_id: Option<&str>,
    ) -> Result<GeofenceEvaluation, TrackerError> {
        let client = self.shared.credentials.authorized_client().await?;
        let mut request = BatchEvaluateRequest::new(collection_name, device_id, samples);
        if let Some(identity_id) = identity_id {
            request = request.with_identity(identity_id);
        }

        let evaluation = client.evaluate_geofences(&request).await?;
        for failed in &evaluation.errors {
            warn!(
                "Geofence evaluation failed at {}: {} {}",
                failed.sample_time, failed.code, failed.message
            );
        }
        Ok(evaluation)
    }
}
