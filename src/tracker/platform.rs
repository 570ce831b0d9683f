use std::sync::Arc;

use crate::credentials::CredentialProvider;
use crate::data_dir::DataDir;
use crate::source::LocationSource;
use crate::store::{KeyValueStore, SampleStore, StorageResult};

/// Everything the tracker needs from its host.
#[derive(Clone)]
pub struct Platform {
    pub source: Arc<dyn LocationSource>,
    pub credentials: Option<Arc<dyn CredentialProvider>>,
    pub preferences: Arc<dyn KeyValueStore>,
    /// Holds only the device id.
    pub device_store: Arc<dyn KeyValueStore>,
    pub samples: Arc<SampleStore>,
}

impl Platform {
    pub fn from_data_dir(
        dir: &DataDir,
        source: Arc<dyn LocationSource>,
        credentials: Option<Arc<dyn CredentialProvider>>,
    ) -> StorageResult<Self> {
        Ok(Platform {
            source,
            credentials,
            preferences: Arc::new(dir.open_preferences()?),
            device_store: Arc::new(dir.open_device_store()?),
            samples: Arc::new(dir.open_samples()?),
        })
    }
}
