use std::path::{Path, PathBuf};

use crate::store::{FileKeyValueStore, SampleStore, StorageResult};

const SAMPLES_DIR: &str = "samples";
const PREFERENCES_FILE: &str = "preferences.yaml";
const DEVICE_FILE: &str = "device.yaml";

/// Layout of a tracker's state under one root directory. The device id
/// lives apart from the other preferences so clearing settings keeps it.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn samples_path(&self) -> PathBuf {
        self.root.join(SAMPLES_DIR)
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.root.join(PREFERENCES_FILE)
    }

    pub fn device_path(&self) -> PathBuf {
        self.root.join(DEVICE_FILE)
    }

    pub fn open_samples(&self) -> StorageResult<SampleStore> {
        SampleStore::open(self.samples_path())
    }

    pub fn open_preferences(&self) -> StorageResult<FileKeyValueStore> {
        FileKeyValueStore::open(self.preferences_path())
    }

    pub fn open_device_store(&self) -> StorageResult<FileKeyValueStore> {
        FileKeyValueStore::open(self.device_path())
    }
}
