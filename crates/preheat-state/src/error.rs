//! Error types for the preheat state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A record is missing required fields; every missing field is named.
    #[error("missing [{}]", .0.join(","))]
    Validation(Vec<String>),

    #[error("invalid status {0}")]
    InvalidStatus(String),

    #[error("empty {0}")]
    EmptyKey(&'static str),

    #[error("invalid namespace {0:?}: must not contain ':'")]
    InvalidNamespace(String),
}

impl StateError {
    /// Whether the failure came from the storage backend rather than
    /// from the caller's input.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            StateError::Open(_)
                | StateError::Transaction(_)
                | StateError::Table(_)
                | StateError::Read(_)
                | StateError::Write(_)
        )
    }
}
