//! WebSocket implementation of [`EventChannel`].
//!
//! Frames are JSON text messages of the form `{"event": "<name>", "data": {...}}`
//! where `<name>` is one of the wire names of [`EventKind`]. The auth token is
//! passed as the `token` query parameter.
//!
//! A supervisor task owns the socket:
//!
//! - a live connection that drops is retried after the next backoff delay
//! - a failed attempt reports [`ConnectionEvent::Error`] and waits for
//!   [`EventChannel::schedule_reconnect`] before backing off and retrying
//! - backoff resets after every successful connect
//! - once the attempt cap is reached the channel settles in
//!   [`ConnectionState::Error`]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::ExponentialBuilder;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::model::{ConnectionEvent, ConnectionState, EventKind};
use crate::retry::{reconnect_backoff, reconnect_delays};
use crate::traits::{EventChannel, EventHandlerFn};

/// Capacity of the lifecycle broadcast.
const LIFECYCLE_CAPACITY: usize = 64;

/// WebSocket channel configuration.
#[derive(Debug, Clone)]
pub struct WsChannelConfig {
    /// Socket URL, `ws://` or `wss://`.
    pub url: String,
    pub reconnect_min_delay: Duration,
    pub reconnect_max_delay: Duration,
    /// Reconnect attempts before giving up. 0 retries forever.
    pub max_reconnect_attempts: usize,
}

impl Default for WsChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000".to_string(),
            reconnect_min_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            max_reconnect_attempts: 0,
        }
    }
}

impl WsChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_reconnect_delays(mut self, min: Duration, max: Duration) -> Self {
        self.reconnect_min_delay = min;
        self.reconnect_max_delay = max;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: usize) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        reconnect_backoff(
            self.reconnect_min_delay,
            self.reconnect_max_delay,
            self.max_reconnect_attempts,
        )
    }

    /// Socket URL with the auth token attached.
    fn url_with_token(&self, auth_token: &str) -> Result<Url> {
        let mut url = Url::parse(&self.url).map_err(|e| {
            ClientError::InvalidArgument(format!("invalid socket url '{}': {}", self.url, e))
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ClientError::InvalidArgument(format!(
                "socket url '{}' must use ws or wss",
                self.url
            )));
        }
        if !auth_token.is_empty() {
            url.query_pairs_mut().append_pair("token", auth_token);
        }
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// State shared between the channel handle and its supervisor task.
struct Shared {
    handlers: RwLock<HashMap<EventKind, EventHandlerFn>>,
    state: watch::Sender<ConnectionState>,
    lifecycle: broadcast::Sender<ConnectionEvent>,
    reconnect: Notify,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.lifecycle.send(event);
    }

    async fn dispatch(&self, text: &str) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping malformed push frame");
                return;
            }
        };

        let Some(kind) = EventKind::from_wire(&frame.event) else {
            debug!(event = %frame.event, "Ignoring unknown push event");
            return;
        };

        let handler = self.handlers.read().await.get(&kind).cloned();
        match handler {
            Some(handler) => handler(frame.data),
            None => debug!(event = %kind, "No handler registered"),
        }
    }

    /// Read frames until the socket closes. Returns `true` on shutdown.
    async fn pump(
        &self,
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let (mut write, mut read) = stream.split();
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = write.close().await;
                    return true;
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text).await,
                    Some(Ok(Message::Close(_))) | None => return false,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Push socket read failed");
                        return false;
                    }
                },
            }
        }
    }
}

async fn supervise(
    url: Url,
    shared: Arc<Shared>,
    backoff: ExponentialBuilder,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut delays = reconnect_delays(&backoff);

    loop {
        shared.set_state(ConnectionState::Connecting);
        let attempt = tokio::select! {
            _ = shutdown.changed() => break,
            attempt = connect_async(url.as_str()) => attempt,
        };

        match attempt {
            Ok((stream, _)) => {
                delays = reconnect_delays(&backoff);
                info!(url = %url.host_str().unwrap_or_default(), "Push channel connected");
                shared.set_state(ConnectionState::Connected);
                shared.emit(ConnectionEvent::Connected);

                if shared.pump(stream, &mut shutdown).await {
                    break;
                }

                info!("Push channel disconnected");
                shared.set_state(ConnectionState::Disconnected);
                shared.emit(ConnectionEvent::Disconnected);
            }
            Err(e) => {
                warn!(error = %e, "Push channel connect failed");
                shared.set_state(ConnectionState::Error);
                shared.emit(ConnectionEvent::Error(e.to_string()));

                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = shared.reconnect.notified() => {}
                }
            }
        }

        let Some(delay) = delays.next() else {
            warn!("Push channel reconnect attempts exhausted");
            shared.set_state(ConnectionState::Error);
            return;
        };
        debug!(delay = ?delay, "Reconnecting push channel");

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    shared.set_state(ConnectionState::Disconnected);
}

struct Supervisor {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Supervisor {
    async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Push-event channel over a WebSocket.
pub struct WsEventChannel {
    config: WsChannelConfig,
    shared: Arc<Shared>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl WsEventChannel {
    pub fn new(config: WsChannelConfig) -> Self {
        let (lifecycle, _) = broadcast::channel(LIFECYCLE_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            shared: Arc::new(Shared {
                handlers: RwLock::new(HashMap::new()),
                state,
                lifecycle,
                reconnect: Notify::new(),
            }),
            supervisor: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &WsChannelConfig {
        &self.config
    }
}

#[async_trait]
impl EventChannel for WsEventChannel {
    async fn connect(&self, auth_token: &str) -> Result<()> {
        let url = self.config.url_with_token(auth_token)?;

        let mut slot = self.supervisor.lock().await;
        if let Some(previous) = slot.take() {
            previous.stop().await;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(supervise(
            url,
            Arc::clone(&self.shared),
            self.config.backoff(),
            shutdown_rx,
        ));
        *slot = Some(Supervisor { shutdown, task });
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(supervisor) = self.supervisor.lock().await.take() {
            supervisor.stop().await;
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    async fn subscribe(&self, kind: EventKind, handler: EventHandlerFn) {
        self.shared.handlers.write().await.insert(kind, handler);
    }

    async fn unsubscribe(&self, kind: EventKind) {
        self.shared.handlers.write().await.remove(&kind);
    }

    fn schedule_reconnect(&self) {
        self.shared.reconnect.notify_one();
    }

    fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    fn lifecycle_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.lifecycle.subscribe()
    }
}
