//! Capability traits for the complaint backend.
//!
//! The reconciliation core only talks to the backend through these two
//! traits. Network implementations live in [`crate::http`] and
//! [`crate::ws`]; tests substitute in-memory ones.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::model::{
    Aggregate, BulkFetch, ComplaintId, ComplaintRecord, ComplaintStatus, ConnectionEvent,
    ConnectionState, EventKind,
};

/// Request/response access to complaint data.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read every complaint, optionally paired with an aggregate.
    async fn fetch_complaints(&self) -> Result<BulkFetch>;

    /// Read the backend's aggregate counts.
    async fn fetch_aggregate(&self) -> Result<Aggregate>;

    /// Change a complaint's status and return the authoritative record.
    ///
    /// Fails with [`crate::ClientError::Status`] on a non-2xx response.
    async fn update_status(
        &self,
        id: &ComplaintId,
        status: ComplaintStatus,
    ) -> Result<ComplaintRecord>;
}

/// Handler invoked with the raw payload of a push event.
///
/// Handlers run on the channel's delivery task, in delivery order.
pub type EventHandlerFn = Arc<dyn Fn(Value) + Send + Sync>;

/// Persistent push-event connection.
///
/// Implementations own their reconnect policy. Lifecycle transitions are
/// reported on the broadcast returned by [`EventChannel::lifecycle_events`].
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Open the connection. Failures after this returns are reported as
    /// [`ConnectionEvent::Error`].
    async fn connect(&self, auth_token: &str) -> Result<()>;

    /// Close the connection and stop reconnecting.
    async fn disconnect(&self);

    /// Register the handler for one event kind, replacing any previous one.
    async fn subscribe(&self, kind: EventKind, handler: EventHandlerFn);

    /// Remove the handler for one event kind.
    async fn unsubscribe(&self, kind: EventKind);

    /// Ask the channel to retry after an error, using its own backoff.
    fn schedule_reconnect(&self);

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Receiver for lifecycle transitions.
    fn lifecycle_events(&self) -> broadcast::Receiver<ConnectionEvent>;
}
