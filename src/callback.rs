use crate::sample::Sample;

/// Notifications emitted by the tracking pipeline. Every method defaults
/// to a no-op so hosts only implement what they observe.
pub trait LocationTrackingCallback: Send + Sync {
    /// A captured location was queued for upload.
    fn on_location_received(&self, _sample: &Sample) {}

    fn on_upload_started(&self, _batch: &[Sample]) {}

    fn on_uploaded(&self, _batch: &[Sample]) {}

    /// A queued sample was rejected by a filter and dropped.
    fn on_upload_skipped(&self, _sample: &Sample) {}

    fn on_location_availability_changed(&self, _available: bool) {}
}
