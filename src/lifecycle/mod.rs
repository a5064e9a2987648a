//! Connection lifecycle handler.
//!
//! Owns one connection to an [`EventChannel`] at a time and turns its
//! lifecycle events into core actions:
//!
//! ```text
//! idle --connect()--> connecting
//! connecting --connected--> live          (bulk resync)
//! connecting --error--> retrying
//! live --disconnected--> retrying
//! retrying --connected--> live            (bulk resync)
//! any --teardown()--> idle                (unsubscribe all)
//! ```
//!
//! Error events ask the channel to reconnect with its own backoff.
//! Disconnects are left to the staleness poller.

use std::sync::Arc;

use complaint_sync_client::{
    ConnectionEvent, EventChannel, EventHandlerFn, EventKind, RemoteStore,
};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::reconcile::ReconciliationCore;

/// Handler state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LifecycleState {
    #[default]
    Idle,
    Connecting,
    Live,
    Retrying,
}

/// Outcome of feeding one channel event to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: LifecycleState,
    /// Run a bulk fetch to catch up on missed events.
    pub resync: bool,
    /// Ask the channel to reconnect.
    pub reconnect: bool,
}

impl LifecycleState {
    /// Pure transition function. Events while idle are ignored.
    pub fn on_event(self, event: &ConnectionEvent) -> Transition {
        use LifecycleState::*;

        let stay = Transition {
            next: self,
            resync: false,
            reconnect: false,
        };
        if self == Idle {
            return stay;
        }

        match event {
            ConnectionEvent::Connected => Transition {
                next: Live,
                resync: true,
                reconnect: false,
            },
            ConnectionEvent::Disconnected => Transition { next: Retrying, ..stay },
            ConnectionEvent::Error(_) => Transition {
                next: Retrying,
                resync: false,
                reconnect: true,
            },
        }
    }
}

/// Lifecycle handler bound to one core and one channel.
pub struct ConnectionLifecycle {
    channel: Arc<dyn EventChannel>,
    remote: Arc<dyn RemoteStore>,
    core: Arc<ReconciliationCore>,
    state: Arc<watch::Sender<LifecycleState>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionLifecycle {
    pub fn new(
        channel: Arc<dyn EventChannel>,
        remote: Arc<dyn RemoteStore>,
        core: Arc<ReconciliationCore>,
    ) -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        Self {
            channel,
            remote,
            core,
            state: Arc::new(state),
            listener: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Receiver for handler state changes.
    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Subscribe the core to push events and open the channel.
    ///
    /// An existing connection is torn down first so events are never
    /// delivered twice.
    pub async fn connect(&self, auth_token: &str) -> Result<()> {
        let mut listener = self.listener.lock().await;
        if listener.is_some() || self.state() != LifecycleState::Idle {
            debug!("Reconnecting, tearing down previous connection");
            self.release(&mut listener).await;
        }

        self.state.send_replace(LifecycleState::Connecting);

        for kind in EventKind::ALL {
            self.channel.subscribe(kind, self.handler_for(kind)).await;
        }

        // Subscribe to lifecycle events before connecting so the first
        // `connected` cannot be missed.
        let events = self.channel.lifecycle_events();
        *listener = Some(tokio::spawn(listen(
            events,
            Arc::clone(&self.channel),
            Arc::clone(&self.remote),
            Arc::clone(&self.core),
            Arc::clone(&self.state),
        )));

        if let Err(e) = self.channel.connect(auth_token).await {
            warn!(error = %e, "Event channel rejected connect");
            self.release(&mut listener).await;
            return Err(SyncError::Connection(e.to_string()));
        }

        info!("Connection lifecycle started");
        Ok(())
    }

    /// Unsubscribe every handler, close the channel and return to idle.
    pub async fn teardown(&self) {
        let mut listener = self.listener.lock().await;
        if listener.is_none() && self.state() == LifecycleState::Idle {
            return;
        }
        self.release(&mut listener).await;
        info!("Connection lifecycle torn down");
    }

    async fn release(&self, listener: &mut Option<JoinHandle<()>>) {
        if let Some(task) = listener.take() {
            task.abort();
            let _ = task.await;
        }
        for kind in EventKind::ALL {
            self.channel.unsubscribe(kind).await;
        }
        self.channel.disconnect().await;
        self.state.send_replace(LifecycleState::Idle);
    }

    fn handler_for(&self, kind: EventKind) -> EventHandlerFn {
        let core = Arc::clone(&self.core);
        Arc::new(move |payload| {
            // Malformed payloads are logged by the core.
            let _ = core.apply_payload(kind, payload);
        })
    }
}

async fn listen(
    mut events: broadcast::Receiver<ConnectionEvent>,
    channel: Arc<dyn EventChannel>,
    remote: Arc<dyn RemoteStore>,
    core: Arc<ReconciliationCore>,
    state: Arc<watch::Sender<LifecycleState>>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "Lifecycle listener lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let current = *state.borrow();
        let transition = current.on_event(&event);
        state.send_replace(transition.next);
        debug!(from = ?current, to = ?transition.next, event = ?event, "Lifecycle transition");

        if transition.reconnect {
            if let ConnectionEvent::Error(cause) = &event {
                warn!(error = %SyncError::Connection(cause.clone()), "Scheduling reconnect");
            }
            channel.schedule_reconnect();
        }

        if transition.resync {
            // Failures are recorded on the snapshot; the poller retries.
            let _ = core.refresh_from(remote.as_ref()).await;
        }
    }
}
