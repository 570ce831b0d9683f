use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TransmitError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("service error {code}: {message}")]
    Service { code: String, message: String },
}

impl TransmitError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransmitError::NotFound(_))
    }
}
