//! Clients for the complaint tracking backend.
//!
//! This crate provides the wire model shared with the backend and the two
//! capability traits the reconciliation core consumes:
//!
//! - [`RemoteStore`]: request/response reads and status writes
//! - [`EventChannel`]: a persistent push-event connection
//!
//! Network implementations are [`HttpRemoteStore`] (REST over `reqwest`) and
//! [`WsEventChannel`] (JSON frames over WebSocket).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use complaint_sync_client::{HttpRemoteStore, HttpStoreConfig, RemoteStore};
//!
//! async fn example() -> complaint_sync_client::Result<()> {
//!     let store = HttpRemoteStore::new(
//!         HttpStoreConfig::new("http://localhost:3000/api").with_auth_token("jwt"),
//!     )?;
//!     let fetched = store.fetch_complaints().await?;
//!     println!("{} complaints", fetched.records.len());
//!     Ok(())
//! }
//! ```
//!
//! # Mocking for Tests
//!
//! Implement [`RemoteStore`] or [`EventChannel`] directly to substitute the
//! backend in tests.

pub mod error;
pub mod http;
pub mod model;
pub mod retry;
pub mod traits;
pub mod ws;

pub use error::{ClientError, PayloadError, Result};
pub use http::{HttpRemoteStore, HttpStoreConfig};
pub use model::{
    Aggregate, AnalyticsPayload, AreaCount, BulkFetch, ComplaintId, ComplaintRecord,
    ComplaintStatus, ConnectionEvent, ConnectionState, DepartmentCount, EventKind,
};
pub use traits::{EventChannel, EventHandlerFn, RemoteStore};
pub use ws::{WsChannelConfig, WsEventChannel};
