//! Live-sync facade for presentation layers.
//!
//! [`LiveSync`] wires a [`ReconciliationCore`] to a remote store, an event
//! channel and a staleness poller, and exposes the read side (snapshots and
//! change notifications) plus status changes.
//!
//! Status changes are never applied optimistically. The authoritative record
//! returned by the backend is applied as an update; a failure leaves the
//! snapshot untouched. At most one change per complaint id may be in flight.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use complaint_sync_client::{
    ClientError, ComplaintId, ComplaintStatus, EventChannel, RemoteStore,
};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::lifecycle::{ConnectionLifecycle, LifecycleState};
use crate::poller::StalenessPoller;
use crate::reconcile::{ReconciliationCore, Snapshot};

/// Timing for a [`LiveSync`].
#[derive(Debug, Clone)]
pub struct LiveSyncConfig {
    pub poll_interval: Duration,
    pub status_change_timeout: Duration,
}

impl Default for LiveSyncConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for LiveSyncConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            status_change_timeout: config.status_change_timeout(),
        }
    }
}

/// Claim on one complaint id, released on drop.
struct InFlight<'a> {
    ids: &'a Mutex<HashSet<ComplaintId>>,
    id: ComplaintId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.ids.lock().remove(&self.id);
    }
}

/// Whether [`LiveSync::start`] has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unstarted,
    Started,
}

/// Reconciled, live-updating view of the complaint backend.
pub struct LiveSync {
    core: Arc<ReconciliationCore>,
    remote: Arc<dyn RemoteStore>,
    lifecycle: ConnectionLifecycle,
    poller: StalenessPoller,
    in_flight: Mutex<HashSet<ComplaintId>>,
    config: LiveSyncConfig,
    /// Held for the whole of `start` and by `teardown`, so a teardown never
    /// runs between a connect and the poller being armed.
    phase: tokio::sync::Mutex<Phase>,
    torn_down: AtomicBool,
}

impl LiveSync {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        channel: Arc<dyn EventChannel>,
        config: LiveSyncConfig,
    ) -> Self {
        let core = Arc::new(ReconciliationCore::new());
        let lifecycle = ConnectionLifecycle::new(channel, Arc::clone(&remote), Arc::clone(&core));
        Self {
            core,
            remote,
            lifecycle,
            poller: StalenessPoller::new(config.poll_interval),
            in_flight: Mutex::new(HashSet::new()),
            config,
            phase: tokio::sync::Mutex::new(Phase::Unstarted),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Initial fetch, connect, then arm the poller.
    ///
    /// A failed initial fetch is not fatal; it shows up as the snapshot's
    /// sync error and is retried by the next resync or poll.
    ///
    /// A second call fails with [`SyncError::PollerRearmed`] before any I/O.
    /// A teardown during the initial fetch makes this return
    /// [`SyncError::TornDown`] without connecting.
    pub async fn start(&self, auth_token: &str) -> Result<()> {
        let mut phase = self.phase.lock().await;
        if self.is_torn_down() {
            return Err(SyncError::TornDown);
        }
        if *phase == Phase::Started {
            return Err(SyncError::PollerRearmed);
        }

        if let Err(e) = self.core.refresh_from(self.remote.as_ref()).await {
            warn!(error = %e, "Initial fetch failed, continuing");
        }

        if self.is_torn_down() {
            debug!("Torn down during initial fetch, not connecting");
            return Err(SyncError::TornDown);
        }

        self.lifecycle.connect(auth_token).await?;

        let core = Arc::clone(&self.core);
        let remote = Arc::clone(&self.remote);
        self.poller
            .start(move || {
                let core = Arc::clone(&core);
                let remote = Arc::clone(&remote);
                async move {
                    let _ = core.refresh_from(remote.as_ref()).await;
                }
            })
            .await?;

        *phase = Phase::Started;
        info!(poll_interval = ?self.config.poll_interval, "Live sync started");
        Ok(())
    }

    /// Bulk fetch now.
    pub async fn refresh(&self) -> Result<()> {
        self.core.refresh_from(self.remote.as_ref()).await
    }

    /// Ask the backend to change a complaint's status.
    ///
    /// Fails with [`SyncError::AlreadyInProgress`] while another change for
    /// the same id is outstanding. A result arriving after
    /// [`LiveSync::teardown`] is discarded and reported as success.
    #[tracing::instrument(name = "sync.request_status_change", skip_all, fields(id = %id, status = %status))]
    pub async fn request_status_change(
        &self,
        id: &ComplaintId,
        status: ComplaintStatus,
    ) -> Result<()> {
        if self.is_torn_down() {
            return Err(SyncError::TornDown);
        }
        let _claim = self.claim(id)?;

        let deadline = self.config.status_change_timeout;
        let outcome =
            tokio::time::timeout(deadline, self.remote.update_status(id, status)).await;

        if self.core.is_shut_down() {
            debug!("Status change resolved after teardown, discarding");
            return Ok(());
        }

        match outcome {
            Ok(Ok(record)) => {
                self.core.apply_update(record);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Status change rejected");
                Err(e.into())
            }
            Err(_) => {
                warn!(timeout = ?deadline, "Status change timed out");
                Err(SyncError::Remote(ClientError::Timeout(deadline)))
            }
        }
    }

    fn claim(&self, id: &ComplaintId) -> Result<InFlight<'_>> {
        if !self.in_flight.lock().insert(id.clone()) {
            return Err(SyncError::AlreadyInProgress(id.clone()));
        }
        Ok(InFlight {
            ids: &self.in_flight,
            id: id.clone(),
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        self.core.snapshot()
    }

    /// Receiver notified after every applied change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.core.subscribe()
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn core(&self) -> &Arc<ReconciliationCore> {
        &self.core
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Stop the poller, drop the connection and freeze the snapshot.
    ///
    /// Idempotent. A torn-down sync cannot be started again.
    pub async fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.core.shut_down();

        // Waits out a `start` in progress; anything it connected is released.
        let _phase = self.phase.lock().await;
        self.poller.cancel().await;
        self.lifecycle.teardown().await;
        info!("Live sync torn down");
    }
}
