//! Push channel lifecycle with exponential reconnect backoff.
//!
//! The controller runs as a single task per service start:
//!
//! ```text
//! Disconnected → Connecting → Connected → (error / close) → Backoff(attempt) → Connecting → ...
//! ```
//!
//! Cancelling the service token moves it to `TornDown` from any state. Only
//! one channel is open at a time and it is always closed before the next one
//! is opened.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::auth::AuthHandle;
use crate::backoff::ReconnectBackoff;
use crate::config::NotifyConfig;
use crate::error::NotifyError;
use crate::event::{ClientEvent, PushEvent};
use crate::transport::{PushStream, PushTransport};

/// Reconnection controller state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting `delay` before reconnect attempt number `attempt`
    Backoff { attempt: u32, delay: Duration },
    TornDown,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Backoff { attempt, delay } => {
                write!(f, "backoff (attempt {attempt}, {}ms)", delay.as_millis())
            }
            Self::TornDown => write!(f, "torn down"),
        }
    }
}

/// What the controller hands to the service dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ChannelSignal {
    /// A channel was (re)established; resynchronize the cache.
    Connected,
    /// A data event from the open channel.
    Event(PushEvent),
}

/// Observable connection status shared with the service.
pub(crate) struct ConnectionStatus {
    state_tx: watch::Sender<ConnectionState>,
    connected: AtomicBool,
    events: broadcast::Sender<ClientEvent>,
}

impl ConnectionStatus {
    pub(crate) fn new(events: broadcast::Sender<ClientEvent>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state_tx,
            connected: AtomicBool::new(false),
            events,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state.clone();
            true
        });
        if changed {
            trace!(%state, "Connection state changed");
            let _ = self.events.send(ClientEvent::StateChanged(state));
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        if self.connected.swap(connected, Ordering::SeqCst) != connected {
            let _ = self.events.send(ClientEvent::ConnectionChanged { connected });
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Why a channel session ended.
#[derive(Debug)]
enum SessionEnd {
    /// Service teardown.
    Cancelled,
    /// The token changed or was cleared.
    AuthChanged,
    /// The dispatcher is gone.
    DispatcherClosed,
    /// Server close, stream end or transport error.
    Lost(String),
}

pub(crate) struct ConnectionController {
    transport: Arc<dyn PushTransport>,
    auth: AuthHandle,
    status: Arc<ConnectionStatus>,
    signals: mpsc::Sender<ChannelSignal>,
    backoff: ReconnectBackoff,
    connect_timeout: Duration,
}

impl ConnectionController {
    pub(crate) fn new(
        config: &NotifyConfig,
        transport: Arc<dyn PushTransport>,
        auth: AuthHandle,
        status: Arc<ConnectionStatus>,
        signals: mpsc::Sender<ChannelSignal>,
    ) -> Self {
        Self {
            transport,
            auth,
            status,
            signals,
            backoff: ReconnectBackoff::new(
                config.base_reconnect_delay(),
                config.max_reconnect_delay(),
            ),
            connect_timeout: config.connect_timeout(),
        }
    }

    /// Run until `cancel` fires.
    pub(crate) async fn run(mut self, cancel: CancellationToken) {
        let mut auth_rx = self.auth.subscribe();

        loop {
            let token = auth_rx.borrow_and_update().clone();
            let Some(token) = token else {
                // No identity, no connection attempt.
                self.backoff.reset();
                self.status.set_state(ConnectionState::Disconnected);
                debug!("No auth token, waiting for login");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = auth_rx.changed() => {}
                }
                continue;
            };

            self.status.set_state(ConnectionState::Connecting);
            let connect =
                tokio::time::timeout(self.connect_timeout, self.transport.connect(&token));
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = connect => {
                    result.unwrap_or_else(|_| Err(NotifyError::Timeout(self.connect_timeout)))
                }
            };

            match result {
                Ok(stream) => {
                    self.backoff.reset();
                    self.status.set_state(ConnectionState::Connected);
                    self.status.set_connected(true);
                    info!("Push channel connected");

                    if self.signals.send(ChannelSignal::Connected).await.is_err() {
                        close_stream(stream).await;
                        break;
                    }

                    let end = self.pump(stream, &cancel, &mut auth_rx).await;
                    self.status.set_connected(false);

                    match end {
                        SessionEnd::Cancelled | SessionEnd::DispatcherClosed => break,
                        SessionEnd::AuthChanged => {
                            info!("Auth changed, push channel closed");
                            self.status.set_state(ConnectionState::Disconnected);
                            continue;
                        }
                        SessionEnd::Lost(reason) => {
                            warn!(%reason, "Push channel disconnected");
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        attempt = self.backoff.attempts() + 1,
                        error = %e,
                        "Push channel connect failed"
                    );
                }
            }

            let delay = self.backoff.next_delay();
            self.backoff.record_failure();
            let attempt = self.backoff.attempts();
            self.status.set_state(ConnectionState::Backoff { attempt, delay });
            self.status.emit(ClientEvent::Reconnecting { attempt, delay });
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
                // A login or logout during backoff takes effect right away.
                _ = auth_rx.changed() => {}
            }
        }

        self.status.set_connected(false);
        self.status.set_state(ConnectionState::TornDown);
        debug!("Connection controller stopped");
    }

    /// Forward events from one open channel until it ends.
    ///
    /// The channel is always closed before returning.
    async fn pump(
        &self,
        mut stream: Box<dyn PushStream>,
        cancel: &CancellationToken,
        auth_rx: &mut watch::Receiver<Option<String>>,
    ) -> SessionEnd {
        let end = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break SessionEnd::Cancelled,

                changed = auth_rx.changed() => {
                    if changed.is_err() {
                        break SessionEnd::Cancelled;
                    }
                    break SessionEnd::AuthChanged;
                }

                event = stream.next_event() => match event {
                    None => break SessionEnd::Lost("stream closed".to_string()),
                    Some(Err(NotifyError::Protocol(reason))) => {
                        warn!(%reason, "Ignoring malformed push frame");
                    }
                    Some(Err(e)) => break SessionEnd::Lost(e.to_string()),
                    Some(Ok(PushEvent::Disconnect { reason })) => {
                        let reason = reason.unwrap_or_else(|| "server disconnect".to_string());
                        break SessionEnd::Lost(reason);
                    }
                    Some(Ok(PushEvent::ConnectError { message })) => {
                        break SessionEnd::Lost(message);
                    }
                    Some(Ok(PushEvent::Connect)) => trace!("Server confirmed connect"),
                    Some(Ok(event)) => {
                        trace!(event = event.name(), "Push event received");
                        if self.signals.send(ChannelSignal::Event(event)).await.is_err() {
                            break SessionEnd::DispatcherClosed;
                        }
                    }
                },
            }
        };

        close_stream(stream).await;
        end
    }
}

async fn close_stream(mut stream: Box<dyn PushStream>) {
    stream.close().await;
}
