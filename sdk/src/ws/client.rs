//! Reconnecting WebSocket client implementation.
//!
//! A single driver task owns the connection attempt, the presence
//! heartbeat and the reconnect timer. The driver walks
//! `Idle -> Connecting -> Open -> Reconnecting -> Connecting -> ...` until
//! [`ReconnectingClient::shutdown`] is called or the client is dropped.
//!
//! Outbound envelopes never touch the socket directly: they are queued on
//! a bounded channel drained by a per-session writer task, so sending and
//! the heartbeat never wait on the transport.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::config::ClientConfig;
use super::error::WsError;
use crate::envelope::EventEnvelope;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Lifecycle state of a [`ReconnectingClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// Created, `connect` not called yet.
    Idle,
    /// Transport handshake in progress.
    Connecting,
    /// Connected; heartbeat running.
    Open,
    /// Disconnected; a reconnect is scheduled.
    Reconnecting,
    /// Shut down. Terminal.
    Closed,
}

impl ClientState {
    /// Returns true while envelopes can be sent.
    #[must_use]
    pub const fn is_online(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Status indicator label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Open => "Connected",
            Self::Connecting => "Connecting",
            Self::Idle | Self::Reconnecting | Self::Closed => "Offline",
        }
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Point-in-time view of the client for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStatus {
    /// Relay URL.
    pub url: String,
    /// Current state.
    pub state: ClientState,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Disconnected,
    Shutdown,
}

/// State shared between the client handle and its driver task.
#[derive(Debug)]
struct Shared {
    config: ClientConfig,
    outbound: Mutex<Option<mpsc::Sender<Message>>>,
    state: watch::Sender<ClientState>,
    page: watch::Sender<Option<u32>>,
}

impl Shared {
    fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ClientState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "client state changed");
        }
    }

    /// Stamps the configured identity and URLs onto a new event.
    fn event(&self, event_type: &str) -> EventEnvelope {
        self.stamp(EventEnvelope::event(event_type, &self.config.identity))
    }

    fn stamp(&self, mut envelope: EventEnvelope) -> EventEnvelope {
        if envelope.page.is_none() {
            envelope.page = *self.page.borrow();
        }
        if envelope.site_url.is_none() {
            envelope.site_url.clone_from(&self.config.site_url);
        }
        if envelope.page_url.is_none() {
            envelope.page_url.clone_from(&self.config.page_url);
        }
        envelope
    }

    /// Queues an envelope for the writer without waiting on the socket.
    async fn enqueue(&self, envelope: &EventEnvelope) -> Result<(), WsError> {
        let json = envelope.encode()?;
        let event_type = envelope.event_type.as_deref().unwrap_or("-");

        let outbound = self.outbound.lock().await;
        let sender = match outbound.as_ref() {
            Some(sender) if self.state().is_online() => sender,
            _ => {
                warn!(state = ?self.state(), event_type, "not connected, cannot send");
                return Err(WsError::NotConnected);
            }
        };

        match sender.try_send(Message::Text(json.into())) {
            Ok(()) => {
                debug!(event_type, "queued envelope");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(event_type, "outbound queue full, dropping envelope");
                Err(WsError::SendFailed("outbound queue full".to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(WsError::NotConnected),
        }
    }

    fn deliver(&self, text: &str, events: &mpsc::Sender<EventEnvelope>) {
        let envelope = match EventEnvelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("dropping undecodable frame: {}", e);
                return;
            }
        };

        if envelope.is_greeting() {
            debug!(msg = envelope.msg.as_deref().unwrap_or(""), "relay greeting");
            return;
        }

        if events.try_send(envelope).is_err() {
            warn!("inbound envelope buffer full or closed, dropping envelope");
        }
    }

    /// Runs one OPEN session until the transport goes away or shutdown
    /// is requested. The heartbeat timer lives and dies with the session.
    async fn run_session(
        &self,
        mut source: WsSource,
        events: &mpsc::Sender<EventEnvelope>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        if self.config.send_hello {
            let hello = self.stamp(EventEnvelope::client_hello(&self.config.identity));
            if let Err(e) = self.enqueue(&hello).await {
                warn!("client hello not sent: {}", e);
            }
        }

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => return SessionEnd::Shutdown,
                _ = heartbeat.tick() => {
                    let presence = self.stamp(EventEnvelope::presence(&self.config.identity));
                    if let Err(e) = self.enqueue(&presence).await {
                        warn!("presence heartbeat failed: {}", e);
                    }
                }
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.deliver(text.as_str(), events),
                    Some(Ok(Message::Close(frame))) => {
                        match frame {
                            Some(frame) => warn!(
                                code = u16::from(frame.code),
                                reason = frame.reason.as_str(),
                                "connection closed by relay"
                            ),
                            None => warn!("connection closed by relay"),
                        }
                        return SessionEnd::Disconnected;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("transport error: {}", e);
                        return SessionEnd::Disconnected;
                    }
                    None => {
                        warn!("transport ended");
                        return SessionEnd::Disconnected;
                    }
                },
            }
        }
    }

    /// Detaches the outbound queue and gives the writer `close_timeout`
    /// to flush what is queued and close the socket.
    async fn end_session(&self, mut writer: JoinHandle<()>) {
        self.set_state(ClientState::Reconnecting);
        self.outbound.lock().await.take();

        if tokio::time::timeout(self.config.close_timeout, &mut writer)
            .await
            .is_err()
        {
            warn!(
                "writer still blocked after {}ms, aborting",
                self.config.close_timeout.as_millis()
            );
            writer.abort();
        }
    }
}

/// Forwards queued frames to the socket, then closes it once the queue is
/// detached.
async fn write_loop(mut sink: WsSink, mut rx: mpsc::Receiver<Message>) {
    while let Some(message) = rx.recv().await {
        if let Err(e) = sink.send(message).await {
            debug!("write failed: {}", e);
            return;
        }
    }

    if let Err(e) = sink.close().await {
        debug!("close failed: {}", e);
    }
}

/// Drives connection attempts until shutdown.
async fn drive(
    shared: Arc<Shared>,
    events: mpsc::Sender<EventEnvelope>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::from_config(&shared.config);
    let url = shared.config.url.clone();

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        shared.set_state(ClientState::Connecting);
        info!(url = %url, "connecting");

        let attempt = tokio::select! {
            _ = shutdown.changed() => break,
            result = tokio_tungstenite::connect_async(url.as_str()) => result,
        };

        match attempt {
            Ok((stream, _)) => {
                backoff.reset();
                let (sink, source) = stream.split();
                let (tx, rx) = mpsc::channel(shared.config.outbound_buffer);
                let writer = tokio::spawn(write_loop(sink, rx));

                *shared.outbound.lock().await = Some(tx);
                shared.set_state(ClientState::Open);
                info!(url = %url, "connected");

                let end = shared.run_session(source, &events, &mut shutdown).await;
                shared.end_session(writer).await;

                if end == SessionEnd::Shutdown {
                    break;
                }
            }
            Err(e) => {
                warn!(url = %url, "connection attempt failed: {}", e);
            }
        }

        let delay = backoff.next_delay();
        shared.set_state(ClientState::Reconnecting);
        warn!("reconnecting in {}ms", delay.as_millis());

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    shared.set_state(ClientState::Closed);
    info!(url = %url, "client stopped");
}

/// WebSocket client that reconnects forever with backoff and emits a
/// presence heartbeat while connected.
#[derive(Debug)]
pub struct ReconnectingClient {
    shared: Arc<Shared>,
    events_tx: Mutex<Option<mpsc::Sender<EventEnvelope>>>,
    events_rx: Mutex<mpsc::Receiver<EventEnvelope>>,
    shutdown_tx: watch::Sender<bool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectingClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ClientConfig) -> Result<Self, WsError> {
        config.validate()?;

        let (events_tx, events_rx) = mpsc::channel(config.event_buffer);
        let (state, _) = watch::channel(ClientState::Idle);
        let (page, _) = watch::channel(config.page);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                outbound: Mutex::new(None),
                state,
                page,
            }),
            events_tx: Mutex::new(Some(events_tx)),
            events_rx: Mutex::new(events_rx),
            shutdown_tx,
            driver: Mutex::new(None),
        })
    }

    /// Creates a new client with the given URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_url(url: impl Into<String>) -> Result<Self, WsError> {
        Self::new(ClientConfig::new(url))
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.shared.state()
    }

    /// Returns a receiver that observes every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ClientState> {
        self.shared.state.subscribe()
    }

    /// Returns the URL and current state.
    #[must_use]
    pub fn status(&self) -> ClientStatus {
        ClientStatus {
            url: self.shared.config.url.clone(),
            state: self.state(),
        }
    }

    /// Returns the funnel step stamped on outgoing envelopes.
    #[must_use]
    pub fn page(&self) -> Option<u32> {
        *self.shared.page.borrow()
    }

    /// Sets the funnel step stamped on every envelope sent from now on,
    /// heartbeats included.
    pub fn set_page(&self, page: u32) {
        self.shared.page.send_replace(Some(page));
    }

    /// Starts the driver task. Calling it again while running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Closed`] after shutdown.
    pub async fn connect(&self) -> Result<(), WsError> {
        if *self.shutdown_tx.borrow() {
            return Err(WsError::Closed);
        }

        let mut driver = self.driver.lock().await;
        if driver.is_some() {
            return Ok(());
        }

        let events = self.events_tx.lock().await.take().ok_or(WsError::Closed)?;
        let shared = Arc::clone(&self.shared);
        let shutdown = self.shutdown_tx.subscribe();

        shared.set_state(ClientState::Connecting);
        *driver = Some(tokio::spawn(drive(shared, events, shutdown)));
        Ok(())
    }

    /// Waits until the client reaches `state`.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Closed`] if the client stops before reaching it.
    pub async fn wait_for(&self, state: ClientState) -> Result<(), WsError> {
        let mut rx = self.watch_state();
        rx.wait_for(|current| *current == state || *current == ClientState::Closed)
            .await
            .map_err(|_| WsError::Closed)
            .and_then(|current| {
                if *current == state {
                    Ok(())
                } else {
                    Err(WsError::Closed)
                }
            })
    }

    /// Builds an event stamped with this client's identity, URLs and page.
    #[must_use]
    pub fn event(&self, event_type: &str) -> EventEnvelope {
        self.shared.event(event_type)
    }

    /// Queues an envelope if the connection is open.
    ///
    /// Never waits on the socket. Nothing is kept for later: envelopes
    /// sent while disconnected, or while the outbound queue is full, are
    /// lost.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::NotConnected`] when not open, or
    /// [`WsError::SendFailed`] when the outbound queue is full.
    pub async fn send(&self, envelope: &EventEnvelope) -> Result<(), WsError> {
        self.shared.enqueue(&self.shared.stamp(envelope.clone())).await
    }

    /// Returns the next envelope received from the relay.
    ///
    /// The relay greeting and undecodable frames are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Closed`] once the client has stopped and the
    /// buffer is drained.
    pub async fn next_envelope(&self) -> Result<EventEnvelope, WsError> {
        self.events_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(WsError::Closed)
    }

    /// Stops the client.
    ///
    /// Queues one best-effort `disconnect` envelope, cancels pending
    /// timers and waits for the driver. The writer gets at most
    /// `close_timeout` to flush before it is aborted.
    pub async fn shutdown(&self) {
        if self.state().is_online() {
            let bye = self.shared.stamp(EventEnvelope::disconnect(&self.shared.config.identity));
            if let Err(e) = self.shared.enqueue(&bye).await {
                debug!("disconnect notice not queued: {}", e);
            }
        }

        self.shutdown_tx.send_replace(true);

        if let Some(handle) = self.driver.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("client driver ended abnormally: {}", e);
            }
        }

        self.events_tx.lock().await.take();
        self.shared.outbound.lock().await.take();
        self.shared.set_state(ClientState::Closed);
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Identity;

    #[test]
    fn test_client_new() {
        let client = ReconnectingClient::with_url("ws://127.0.0.1:8787/ws");
        assert!(client.is_ok());
    }

    #[test]
    fn test_client_invalid_config() {
        let client = ReconnectingClient::new(ClientConfig::new(""));
        assert!(client.is_err());
    }

    #[test]
    fn test_client_idle_initially() {
        let client = ReconnectingClient::with_url("ws://127.0.0.1:8787/ws").expect("client");
        assert_eq!(client.state(), ClientState::Idle);
        assert_eq!(client.status().state.label(), "Offline");
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(ClientState::Open.to_string(), "Connected");
        assert!(ClientState::Open.is_online());
        assert!(!ClientState::Reconnecting.is_online());
    }

    #[test]
    fn test_event_is_stamped() {
        let config = ClientConfig::new("ws://127.0.0.1:8787/ws")
            .with_identity(Identity::new("dev", "sess"))
            .with_site_url("https://site.example");
        let client = ReconnectingClient::new(config).expect("client");

        let envelope = client.event("step_view");
        assert_eq!(envelope.device_id.as_deref(), Some("dev"));
        assert_eq!(envelope.session_id.as_deref(), Some("sess"));
        assert_eq!(envelope.site_url.as_deref(), Some("https://site.example"));
    }

    #[tokio::test]
    async fn test_send_while_idle_fails() {
        let client = ReconnectingClient::with_url("ws://127.0.0.1:8787/ws").expect("client");
        let envelope = client.event("consent");

        let result = client.send(&envelope).await;
        assert!(matches!(result, Err(WsError::NotConnected)));
    }

    #[tokio::test]
    async fn test_shutdown_without_connect() {
        let client = ReconnectingClient::with_url("ws://127.0.0.1:8787/ws").expect("client");
        client.shutdown().await;

        assert_eq!(client.state(), ClientState::Closed);
        assert!(matches!(client.connect().await, Err(WsError::Closed)));
        assert!(matches!(client.next_envelope().await, Err(WsError::Closed)));
    }

    #[test]
    fn test_page_stamped_on_events() {
        let config = ClientConfig::new("ws://127.0.0.1:8787/ws").with_page(1);
        let client = ReconnectingClient::new(config).expect("client");
        assert_eq!(client.event("consent").page, Some(1));

        client.set_page(4);
        assert_eq!(client.page(), Some(4));
        assert_eq!(client.event("consent").page, Some(4));

        let explicit = client.shared.stamp(EventEnvelope::presence(&client.config().identity).with_page(2));
        assert_eq!(explicit.page, Some(2));
    }

    #[test]
    fn test_presence_carries_page() {
        let client = ReconnectingClient::with_url("ws://127.0.0.1:8787/ws").expect("client");
        assert_eq!(client.page(), None);

        client.set_page(3);
        let presence = client.shared.stamp(EventEnvelope::presence(&client.config().identity));
        assert_eq!(presence.page, Some(3));
    }
}
