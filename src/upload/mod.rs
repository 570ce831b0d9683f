mod coordinator;
mod last_accepted;

pub use coordinator::{CycleReport, UploadCoordinator, BATCH_SIZE, MAX_RETRY};
pub use last_accepted::LastAccepted;
