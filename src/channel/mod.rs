//! In-process event channel.
//!
//! Implements [`EventChannel`] over tokio broadcast channels so a
//! [`crate::LiveSync`] can run without a push server. Publishers call
//! [`InMemoryEventChannel::publish`]; events reach subscribed handlers only
//! while the channel is connected, as they would over a real socket.
//!
//! Connection failures can be simulated with
//! [`InMemoryEventChannel::set_refuse_connections`] and
//! [`InMemoryEventChannel::drop_connection`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use complaint_sync_client::{
    ConnectionEvent, ConnectionState, EventChannel, EventHandlerFn, EventKind,
    Result as ClientResult,
};
use serde_json::Value;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 1024;

/// Delay before a scheduled reconnect runs.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(100);

struct Inner {
    events: broadcast::Sender<(EventKind, Value)>,
    lifecycle: broadcast::Sender<ConnectionEvent>,
    handlers: Arc<RwLock<HashMap<EventKind, EventHandlerFn>>>,
    state: watch::Sender<ConnectionState>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    refuse: AtomicBool,
    reconnect_delay: Duration,
    /// Bumped on disconnect; pending reconnects from an older epoch are dropped.
    epoch: AtomicUsize,
    connects: AtomicUsize,
    reconnect_requests: AtomicUsize,
}

impl Inner {
    fn emit(&self, event: ConnectionEvent) {
        let state = match &event {
            ConnectionEvent::Connected => ConnectionState::Connected,
            ConnectionEvent::Disconnected => ConnectionState::Disconnected,
            ConnectionEvent::Error(_) => ConnectionState::Error,
        };
        self.state.send_replace(state);
        let _ = self.lifecycle.send(event);
    }

    async fn stop_consumer(&self) -> bool {
        match self.consumer.lock().await.take() {
            Some(consumer) => {
                consumer.abort();
                let _ = consumer.await;
                true
            }
            None => false,
        }
    }

    async fn establish(self: Arc<Self>) {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(ConnectionState::Connecting);

        let mut consumer = self.consumer.lock().await;
        if let Some(previous) = consumer.take() {
            previous.abort();
            let _ = previous.await;
        }

        if self.refuse.load(Ordering::SeqCst) {
            drop(consumer);
            self.emit(ConnectionEvent::Error("connection refused".to_string()));
            return;
        }

        // Subscribe before reporting Connected so nothing published after
        // the event is missed.
        let mut receiver = self.events.subscribe();
        let handlers = Arc::clone(&self.handlers);
        *consumer = Some(tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok((kind, payload)) => {
                        let handler = handlers.read().await.get(&kind).cloned();
                        match handler {
                            Some(handler) => handler(payload),
                            None => debug!(event = %kind, "No handler registered"),
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        error!(skipped = n, "In-memory channel consumer lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
        drop(consumer);

        info!("In-memory event channel connected");
        self.emit(ConnectionEvent::Connected);
    }
}

/// Push-event channel living entirely in this process.
#[derive(Clone)]
pub struct InMemoryEventChannel {
    inner: Arc<Inner>,
}

impl Default for InMemoryEventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventChannel {
    pub fn new() -> Self {
        Self::with_reconnect_delay(DEFAULT_RECONNECT_DELAY)
    }

    pub fn with_reconnect_delay(reconnect_delay: Duration) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (lifecycle, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                events,
                lifecycle,
                handlers: Arc::new(RwLock::new(HashMap::new())),
                state,
                consumer: Mutex::new(None),
                refuse: AtomicBool::new(false),
                reconnect_delay,
                epoch: AtomicUsize::new(0),
                connects: AtomicUsize::new(0),
                reconnect_requests: AtomicUsize::new(0),
            }),
        }
    }

    /// Publish a push event. Returns the number of live connections reached.
    pub fn publish(&self, kind: EventKind, payload: Value) -> usize {
        match self.inner.events.send((kind, payload)) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!(event = %kind, "No live connection, event dropped");
                0
            }
        }
    }

    /// Make subsequent connect attempts fail.
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Drop the live connection as if the server went away.
    pub async fn drop_connection(&self) {
        if self.inner.stop_consumer().await {
            self.inner.emit(ConnectionEvent::Disconnected);
        }
    }

    /// Report a lifecycle event without changing the connection.
    pub fn emit(&self, event: ConnectionEvent) {
        self.inner.emit(event);
    }

    pub async fn handler_count(&self) -> usize {
        self.inner.handlers.read().await.len()
    }

    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn reconnect_requests(&self) -> usize {
        self.inner.reconnect_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventChannel for InMemoryEventChannel {
    async fn connect(&self, _auth_token: &str) -> ClientResult<()> {
        // Failures are reported on the lifecycle stream, like a real socket.
        Arc::clone(&self.inner).establish().await;
        Ok(())
    }

    async fn disconnect(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.stop_consumer().await;
        self.inner.state.send_replace(ConnectionState::Disconnected);
    }

    async fn subscribe(&self, kind: EventKind, handler: EventHandlerFn) {
        self.inner.handlers.write().await.insert(kind, handler);
    }

    async fn unsubscribe(&self, kind: EventKind) {
        self.inner.handlers.write().await.remove(&kind);
    }

    fn schedule_reconnect(&self) {
        self.inner.reconnect_requests.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        let epoch = inner.epoch.load(Ordering::SeqCst);
        tokio::spawn(async move {
            tokio::time::sleep(inner.reconnect_delay).await;
            if inner.epoch.load(Ordering::SeqCst) == epoch {
                inner.establish().await;
            }
        });
    }

    fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    fn lifecycle_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.lifecycle.subscribe()
    }
}
