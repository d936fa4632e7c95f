//! Provider error types.

use preheat_client::ClientError;
use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The instance handed to the registry cannot identify a driver.
    #[error("invalid instance: {0}")]
    InvalidInstance(String),

    #[error("no provider with ID {0} existing")]
    UnknownProvider(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("malformed provider response: {0}")]
    Decode(String),

    #[error("provider reported unknown status {0}")]
    InvalidStatus(String),

    #[error("{0}")]
    Driver(String),
}

impl ProviderError {
    /// Only transport-level failures are worth another attempt; the rest
    /// are configuration problems or protocol mismatches.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Client(e) => e.is_retryable(),
            _ => false,
        }
    }
}
