//! Client error types.

use reqwest::StatusCode;
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised while signing a request.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no auth handler registered for mode: {0}")]
    UnknownMode(String),

    #[error("credential for mode {mode} is missing '{field}'")]
    MissingField { mode: String, field: &'static str },

    #[error("invalid header value for {0}")]
    InvalidHeader(String),
}

/// Errors raised by [`HttpClient`](crate::HttpClient) calls.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("empty url")]
    EmptyUrl,

    #[error("invalid header option {0}")]
    InvalidHeader(String),

    #[error("only JSON data supported: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("failed to build http client: {0}")]
    Build(String),

    /// The request could not be built, usually because the URL is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The remote answered with a status outside the accepted set.
    #[error("{method} '{url}' error: {status} {body}")]
    Status {
        method: String,
        url: String,
        status: StatusCode,
        body: String,
    },
}

impl ClientError {
    /// Classify an error from assembling a request before it is sent.
    pub(crate) fn from_build(e: reqwest::Error) -> Self {
        if e.is_builder() {
            ClientError::InvalidRequest(e.to_string())
        } else {
            ClientError::Transport(e)
        }
    }

    /// Transport failures and server responses may succeed on a later
    /// attempt; malformed requests and missing credentials will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(e) => !e.is_builder(),
            ClientError::Status { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
            }
            _ => false,
        }
    }
}
