mod error;
mod types;

pub use error::TransmitError;
pub use types::{
    BatchEvaluateRequest, BatchUpdateRequest, DevicePositionUpdate, GeofenceEvaluation,
    GeofenceEvaluationError, UploadAck, UploadError,
};

use async_trait::async_trait;

use crate::sample::Location;

/// Wire client of the remote tracking service.
#[async_trait]
pub trait TransmitClient: Send + Sync {
    async fn upload_batch(&self, request: &BatchUpdateRequest) -> Result<UploadAck, TransmitError>;

    /// Last position the service holds for the device. A device without a
    /// recorded position yields [`TransmitError::NotFound`].
    async fn fetch_last_known(
        &self,
        tracker_name: &str,
        device_id: &str,
    ) -> Result<Location, TransmitError>;

    async fn evaluate_geofences(
        &self,
        request: &BatchEvaluateRequest,
    ) -> Result<GeofenceEvaluation, TransmitError>;
}
