use log::{debug, error, info, warn};
use std::sync::Arc;

use super::last_accepted::LastAccepted;
use crate::callback::LocationTrackingCallback;
use crate::client::{BatchUpdateRequest, UploadAck};
use crate::credentials::CredentialGate;
use crate::device::DeviceIdentity;
use crate::filter::{evaluate, FilterChain, FilterDecision};
use crate::sample::{Sample, SampleId};
use crate::store::SampleStore;
use crate::tracker::TrackerError;

/// Samples per remote batch.
pub const BATCH_SIZE: usize = 10;
/// Transmit attempts per batch, retried back to back.
pub const MAX_RETRY: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub queued: usize,
    pub skipped: usize,
    pub uploaded: usize,
    pub batches: usize,
}

/// Drains the sample queue: filters against the last uploaded sample,
/// then transmits in fixed-size batches. A sample leaves the queue only
/// after its batch is acknowledged or a filter rejected it.
pub struct UploadCoordinator {
    tracker_name: String,
    samples: Arc<SampleStore>,
    filters: Arc<FilterChain>,
    last_accepted: Arc<LastAccepted>,
    credentials: CredentialGate,
    device: Arc<DeviceIdentity>,
}

impl UploadCoordinator {
    pub fn new(
        tracker_name: impl Into<String>,
        samples: Arc<SampleStore>,
        filters: Arc<FilterChain>,
        last_accepted: Arc<LastAccepted>,
        credentials: CredentialGate,
        device: Arc<DeviceIdentity>,
    ) -> Self {
        Self {
            tracker_name: tracker_name.into(),
            samples,
            filters,
            last_accepted,
            credentials,
            device,
        }
    }

    pub fn tracker_name(&self) -> &str {
        &self.tracker_name
    }

    pub async fn run_upload_cycle(
        &self,
        callback: Option<&dyn LocationTrackingCallback>,
    ) -> Result<CycleReport, TrackerError> {
        let queued = self.samples.list_all_ascending_by_time()?;
        let mut report = CycleReport {
            queued: queued.len(),
            ..CycleReport::default()
        };
        info!("{} locations queued before filtering", queued.len());
        if queued.is_empty() {
            return Ok(report);
        }

        let reference = self.last_accepted.get();
        let active = self.filters.active_filters();

        let mut accepted = Vec::with_capacity(queued.len());
        for sample in queued {
            match evaluate(&active, &sample, reference.as_ref()) {
                FilterDecision::Accept => accepted.push(sample),
                FilterDecision::Reject(kind) => {
                    debug!(
                        "Sample {} at {} rejected by {} filter",
                        sample.id, sample.timestamp, kind
                    );
                    if let Some(cb) = callback {
                        cb.on_upload_skipped(&sample);
                    }
                    self.samples.delete_by_id(sample.id)?;
                    report.skipped += 1;
                }
            }
        }
        info!(
            "{} locations to upload after filtering ({} skipped)",
            accepted.len(),
            report.skipped
        );

        for batch in accepted.chunks(BATCH_SIZE) {
            if let Some(cb) = callback {
                cb.on_upload_started(batch);
            }
            self.upload_batch(batch).await?;
            if let Some(cb) = callback {
                cb.on_uploaded(batch);
            }
            report.uploaded += batch.len();
            report.batches += 1;
        }

        Ok(report)
    }

    async fn upload_batch(&self, batch: &[Sample]) -> Result<(), TrackerError> {
        let device_id = self.device.get_id().await?;
        let request = BatchUpdateRequest::new(&self.tracker_name, &device_id, batch);

        let ack = transmit_with_retry(&self.credentials, &request).await?;
        for rejected in &ack.errors {
            warn!(
                "Service rejected update at {}: {} {}",
                rejected.sample_time, rejected.code, rejected.message
            );
        }

        let ids: Vec<SampleId> = batch.iter().map(|s| s.id).collect();
        let removed = self.samples.delete_by_ids(&ids)?;
        debug!("Uploaded batch of {}, removed {} from queue", batch.len(), removed);

        if let Some(last) = batch.last() {
            self.last_accepted.advance(last).await?;
        }
        Ok(())
    }
}

/// Credentials are checked before each attempt, so a token that expires
/// between attempts is refreshed instead of failing the rest. A credential
/// failure is not retried.
async fn transmit_with_retry(
    credentials: &CredentialGate,
    request: &BatchUpdateRequest,
) -> Result<UploadAck, TrackerError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let client = credentials.authorized_client().await?;
        match client.upload_batch(request).await {
            Ok(ack) => return Ok(ack),
            Err(e) if attempt < MAX_RETRY => {
                warn!("Upload attempt {}/{} failed, retrying: {}", attempt, MAX_RETRY, e);
            }
            Err(e) => {
                error!("Upload failed after {} attempts: {}", attempt, e);
                return Err(e.into());
            }
        }
    }
}
