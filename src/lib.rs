//! complaint-sync - live reconciliation of complaint data.
//!
//! Keeps an in-memory view of complaint records and aggregate counts
//! consistent with a REST backend, a push-event channel and a periodic
//! fallback poll, for presentation layers that render snapshots.
//!
//! - [`reconcile`]: the canonical view and its apply operations
//! - [`lifecycle`]: connection state machine driving resyncs
//! - [`poller`]: fixed-interval fallback fetch
//! - [`session`]: [`LiveSync`], the facade tying them together
//! - [`query`]: filtering and ordering over snapshots

pub mod channel;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod poller;
pub mod query;
pub mod reconcile;
pub mod session;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use channel::InMemoryEventChannel;
pub use config::Config;
pub use error::{Result, SyncError};
pub use lifecycle::{ConnectionLifecycle, LifecycleState};
pub use poller::StalenessPoller;
pub use query::ComplaintQuery;
pub use reconcile::{AggregateSource, RecordSet, ReconciliationCore, Snapshot};
pub use session::{LiveSync, LiveSyncConfig};
