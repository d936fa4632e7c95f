//! Monitor error types.

use preheat_provider::ProviderError;
use preheat_state::StateError;
use thiserror::Error;

pub type MonitorResult<T> = Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("invalid monitor config: {0}")]
    InvalidConfig(String),

    #[error("monitor already started")]
    AlreadyStarted,

    /// The stored history belongs to another instance than the watch.
    #[error("task {task_id} belongs to instance {owner}, not {instance_id}")]
    InstanceMismatch {
        task_id: String,
        instance_id: String,
        owner: String,
    },
}

impl MonitorError {
    /// Transport failures and storage backend failures are retried; missing
    /// records, unknown providers and bad statuses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            MonitorError::State(e) => e.is_backend(),
            MonitorError::Provider(e) => e.is_retryable(),
            MonitorError::InvalidConfig(_)
            | MonitorError::AlreadyStarted
            | MonitorError::InstanceMismatch { .. } => false,
        }
    }
}
