use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use thiserror::Error;

use crate::client::TransmitClient;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credentials provider not available")]
    Unavailable,
    #[error("credentials invalid: {0}")]
    Invalid(String),
}

/// Source of credentials for the remote service and of the client bound
/// to them.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    fn is_valid(&self) -> bool;

    async fn refresh(&self) -> Result<(), CredentialError>;

    fn client(&self) -> Option<Arc<dyn TransmitClient>>;
}

/// Checked before every remote operation, not once per cycle, since
/// credentials can expire between batches.
#[derive(Clone)]
pub struct CredentialGate {
    provider: Option<Arc<dyn CredentialProvider>>,
}

impl CredentialGate {
    pub fn new(provider: Option<Arc<dyn CredentialProvider>>) -> Self {
        Self { provider }
    }

    pub async fn ensure_valid(&self) -> Result<(), CredentialError> {
        let provider = self.provider.as_ref().ok_or(CredentialError::Unavailable)?;
        if !provider.is_valid() {
            debug!("Credentials expired, refreshing");
            provider.refresh().await?;
        }
        Ok(())
    }

    pub fn client(&self) -> Result<Arc<dyn TransmitClient>, CredentialError> {
        self.provider
            .as_ref()
            .and_then(|p| p.client())
            .ok_or(CredentialError::Unavailable)
    }

    /// `ensure_valid` followed by `client`.
    pub async fn authorized_client(&self) -> Result<Arc<dyn TransmitClient>, CredentialError> {
        self.ensure_valid().await?;
        self.client()
    }
}
