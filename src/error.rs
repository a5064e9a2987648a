//! Error taxonomy for the reconciliation layer.

use complaint_sync_client::{ClientError, ComplaintId, PayloadError};

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced by the reconciliation core and the live-sync facade.
///
/// None of these are fatal; the worst outcome is a stale but consistent view.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Bulk fetch or status update failed. Local state is left intact.
    #[error("Remote store error: {0}")]
    Remote(#[source] ClientError),

    /// The event channel could not connect or reconnect.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A push payload could not be decoded and was dropped.
    #[error("Malformed payload: {0}")]
    Apply(#[from] PayloadError),

    #[error("Status change already in progress for complaint {0}")]
    AlreadyInProgress(ComplaintId),

    #[error("Sync has been torn down")]
    TornDown,

    #[error("Poller cannot be re-armed after cancellation")]
    PollerRearmed,
}

impl From<ClientError> for SyncError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Payload(payload) => SyncError::Apply(payload),
            ClientError::Connection(cause) => SyncError::Connection(cause),
            other => SyncError::Remote(other),
        }
    }
}

impl SyncError {
    /// HTTP status of a failed remote call, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            SyncError::Remote(err) => err.status_code(),
            _ => None,
        }
    }
}
