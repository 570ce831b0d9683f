mod error;
mod fs;
pub mod kv;
pub mod preferences;
pub mod samples;

pub use error::{StorageError, StorageResult};
pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use preferences::{store_key, Preferences};
pub use samples::SampleStore;
