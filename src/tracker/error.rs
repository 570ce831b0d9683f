use thiserror::Error;

use crate::client::TransmitError;
use crate::config::ConfigError;
use crate::credentials::CredentialError;
use crate::filter::FilterKind;
use crate::source::SourceError;
use crate::store::StorageError;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracking already running")]
    AlreadyRunning,
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("transmit failed: {0}")]
    Transmit(#[from] TransmitError),
    #[error("credentials provider not available")]
    CredentialsUnavailable,
    #[error("credentials invalid: {0}")]
    CredentialsInvalid(String),
    #[error("no tracker configuration cached")]
    ConfigurationMissing,
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("location source error: {0}")]
    Source(#[from] SourceError),
    #[error("invalid parameter {1} for {0} filter")]
    InvalidFilterParameter(FilterKind, f64),
}

impl From<CredentialError> for TrackerError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Unavailable => TrackerError::CredentialsUnavailable,
            CredentialError::Invalid(message) => TrackerError::CredentialsInvalid(message),
        }
    }
}
