use log::{debug, error};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::error::{StorageError, StorageResult};
use super::fs::{remove_if_exists, write_atomic};
use crate::sample::{Sample, SampleId};

const ENTRY_EXTENSION: &str = "yaml";
const SEQUENCE_FILE: &str = "sequence";

/// Durable queue of captured samples.
///
/// Every sample lives in its own file under the store directory, named
/// after its id. The highest id ever handed out is kept in a separate
/// sequence file, so ids are never reused even after the queue drains and
/// the process restarts.
pub struct SampleStore {
    base: PathBuf,
    sequence: Mutex<SampleId>,
}

impl SampleStore {
    pub fn open(base: PathBuf) -> StorageResult<Self> {
        std::fs::create_dir_all(&base)?;

        let persisted = read_sequence(&base.join(SEQUENCE_FILE))?;
        let mut highest = persisted;
        for entry in base.read_dir()? {
            let path = entry?.path();
            if let Some(id) = entry_id(&path) {
                highest = highest.max(id);
            }
        }

        debug!(
            "Opened sample store at {} (last id {})",
            base.display(),
            highest
        );

        Ok(SampleStore {
            base,
            sequence: Mutex::new(highest),
        })
    }

    pub fn path(&self) -> &Path {
        &self.base
    }

    fn entry_path(&self, id: SampleId) -> PathBuf {
        self.base.join(format!("{:020}.{}", id, ENTRY_EXTENSION))
    }

    /// Persists the sample and returns its newly assigned id. Never
    /// rejects a sample; filtering happens at upload time.
    pub fn append(&self, sample: &Sample) -> StorageResult<SampleId> {
        let mut sequence = self.sequence.lock().unwrap_or_else(PoisonError::into_inner);
        let id = *sequence + 1;

        write_atomic(&self.base.join(SEQUENCE_FILE), id.to_string().as_bytes())?;
        *sequence = id;

        let entry = Sample { id, ..*sample };
        write_atomic(&self.entry_path(id), serde_yaml::to_string(&entry)?.as_bytes())?;

        Ok(id)
    }

    /// All queued samples, oldest timestamp first. Ties keep insertion order.
    pub fn list_all_ascending_by_time(&self) -> StorageResult<Vec<Sample>> {
        let mut samples = Vec::new();

        for entry in self.base.read_dir()? {
            let entry_path = entry?.path();
            let Some(id) = entry_id(&entry_path) else {
                continue;
            };

            match read_entry(&entry_path, id) {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    error!("Failed to read sample {}: {}", entry_path.display(), e);
                    continue;
                }
            }
        }

        samples.sort_by_key(|s| (s.timestamp, s.id));
        Ok(samples)
    }

    /// Removes a single sample. Missing ids are ignored.
    pub fn delete_by_id(&self, id: SampleId) -> StorageResult<bool> {
        Ok(remove_if_exists(&self.entry_path(id))?)
    }

    /// Removes every listed sample and returns how many were present.
    /// Deleting ids that are already gone is a no-op.
    pub fn delete_by_ids(&self, ids: &[SampleId]) -> StorageResult<usize> {
        let mut removed = 0;
        for id in ids {
            if self.delete_by_id(*id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn len(&self) -> StorageResult<usize> {
        let mut count = 0;
        for entry in self.base.read_dir()? {
            if entry_id(&entry?.path()).is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Drops every queued sample. The id sequence is kept.
    pub fn clear(&self) -> StorageResult<usize> {
        let mut removed = 0;
        for entry in self.base.read_dir()? {
            let path = entry?.path();
            if entry_id(&path).is_some() && remove_if_exists(&path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn entry_id(path: &Path) -> Option<SampleId> {
    if !path.is_file() || path.extension()? != ENTRY_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

fn read_entry(path: &Path, id: SampleId) -> StorageResult<Sample> {
    let content = std::fs::read_to_string(path)?;
    let sample: Sample = serde_yaml::from_str(&content)?;
    if sample.id != id {
        return Err(StorageError::Corrupt {
            key: path.display().to_string(),
            message: format!("entry holds id {} but is named {}", sample.id, id),
        });
    }
    Ok(sample)
}

fn read_sequence(path: &Path) -> StorageResult<SampleId> {
    if !path.exists() {
        return Ok(0);
    }
    let content = std::fs::read_to_string(path)?;
    content
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| StorageError::Corrupt {
            key: path.display().to_string(),
            message: e.to_string(),
        })
}
