//! Fallback bulk-fetch timer.
//!
//! Bounds how stale the canonical view can get when the push channel fails
//! silently. Ticks fire on a fixed interval regardless of connection state.
//!
//! A poller is single-shot: it can be armed once and cancelled once.
//! Arming it again after cancellation fails with [`SyncError::PollerRearmed`].

use std::future::Future;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::{Result, SyncError};

/// Shortest accepted period; `tokio::time::interval` rejects zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

enum PollerState {
    Unarmed,
    Armed {
        cancel: watch::Sender<bool>,
        task: JoinHandle<()>,
    },
    Cancelled,
}

/// Periodic tick driver with a single-shot cancel guard.
pub struct StalenessPoller {
    period: Duration,
    state: Mutex<PollerState>,
}

impl StalenessPoller {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_PERIOD),
            state: Mutex::new(PollerState::Unarmed),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Arm the timer. The first tick fires one period from now.
    pub async fn start<F, Fut>(&self, tick: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock().await;
        if !matches!(*state, PollerState::Unarmed) {
            return Err(SyncError::PollerRearmed);
        }

        let period = self.period;
        let (cancel, mut cancel_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period = ?period, "Staleness poller started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("Staleness poll");
                        tick().await;
                    }
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            info!("Staleness poller stopped");
                            break;
                        }
                    }
                }
            }
        });

        *state = PollerState::Armed { cancel, task };
        Ok(())
    }

    /// Stop the timer. Returns `true` only for the first call.
    pub async fn cancel(&self) -> bool {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, PollerState::Cancelled) {
            PollerState::Armed { cancel, task } => {
                let _ = cancel.send(true);
                // Also interrupts a tick in progress.
                task.abort();
                let _ = task.await;
                true
            }
            PollerState::Unarmed => true,
            PollerState::Cancelled => false,
        }
    }

    pub async fn is_armed(&self) -> bool {
        matches!(*self.state.lock().await, PollerState::Armed { .. })
    }
}
