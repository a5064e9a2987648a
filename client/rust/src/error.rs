//! Error types for the complaint sync client library.

use std::time::Duration;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur during client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error from reqwest.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-2xx status.
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Request did not complete within its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Response payload was decoded but is malformed.
    #[error("invalid payload: {0}")]
    Payload(#[from] PayloadError),

    /// Failed to establish the push-event connection.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Invalid argument provided by caller.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl ClientError {
    /// Returns the HTTP status code if the backend rejected the request.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns true if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Returns true if this is a connection or timeout error.
    pub fn is_connection_error(&self) -> bool {
        match self {
            ClientError::Connection(_) | ClientError::Timeout(_) => true,
            ClientError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    /// Returns true if repeating the same read may succeed.
    ///
    /// Timeouts, connect failures, 429 and 5xx are transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Status { status, .. } => *status == 429 || *status >= 500,
            other => other.is_connection_error(),
        }
    }
}

/// A push or fetch payload that cannot become a domain value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no id")]
    MissingId,

    #[error("payload has no '{0}' field")]
    MissingField(&'static str),

    #[error("field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}
