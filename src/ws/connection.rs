#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream, client_async_tls_with_config,
};

use super::config::Config;
use super::endpoint::Endpoint;
use super::error::{UnsolicitedClose, WsError};
use super::registry::ChannelRegistry;
use super::router::MessageRouter;
use super::traits::ProtocolAdapter;
use crate::Result;
use crate::error::Error;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Broadcast channel capacity for unsolicited-close notifications.
const CLOSE_BROADCAST_CAPACITY: usize = 16;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Successfully connected
    Connected {
        /// When the connection was established
        since: Instant,
    },
    /// Close frame requested, waiting for it to be written
    Disconnecting,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// Commands handed from callers to the session task.
enum Outbound {
    Text(String),
    Close(oneshot::Sender<()>),
}

/// How a session task left its loop.
enum SessionEnd {
    Requested(oneshot::Sender<()>),
    Unsolicited(UnsolicitedClose),
    Abandoned,
}

/// State shared between the manager handles and the session task.
struct Shared<A: ProtocolAdapter> {
    config: Config,
    adapter: Arc<A>,
    registry: Arc<ChannelRegistry<A::Message>>,
    state_tx: watch::Sender<ConnectionState>,
    closed_tx: broadcast::Sender<UnsolicitedClose>,
}

struct ConnectionInner<A: ProtocolAdapter> {
    endpoint: String,
    /// Write path into the current session; replaced on every connect
    outbound: RwLock<Option<mpsc::Sender<Outbound>>>,
    shared: Arc<Shared<A>>,
}

/// Owns the single physical WebSocket connection shared by every channel subscription.
///
/// The connection manager handles:
/// - Endpoint validation, TLS decision and the WebSocket handshake
/// - A fixed-rate text heartbeat while connected
/// - The outbound write path (fire-and-forget, refused when not connected or not writable)
/// - Routing inbound frames to the [`ChannelRegistry`] through the adapter
/// - Reporting socket losses the caller did not request
///
/// Each connection is driven by one spawned task that reads frames, routes them, writes
/// outbound commands and ticks the heartbeat, so inbound messages are routed in arrival
/// order. No reconnection is attempted: observe [`Self::on_unsolicited_disconnect`] and
/// apply a retry policy on top.
///
/// # Example
///
/// ```ignore
/// let connection = ConnectionManager::new("wss://example.com/ws", Config::default(), adapter);
/// connection.connect().await?;
///
/// let lost = connection.on_unsolicited_disconnect();
/// connection.send("{\"event\":\"ping\"}".to_owned())?;
/// ```
pub struct ConnectionManager<A: ProtocolAdapter> {
    inner: Arc<ConnectionInner<A>>,
}

impl<A: ProtocolAdapter> Clone for ConnectionManager<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: ProtocolAdapter> fmt::Debug for ConnectionManager<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.inner.endpoint)
            .field("state", &self.state())
            .field("channels", &self.inner.shared.registry.len())
            .finish_non_exhaustive()
    }
}

impl<A: ProtocolAdapter> ConnectionManager<A> {
    /// Create a disconnected manager for `endpoint`.
    ///
    /// The endpoint is validated by [`Self::connect`], not here.
    #[must_use]
    pub fn new(endpoint: &str, config: Config, adapter: A) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (closed_tx, _) = broadcast::channel(CLOSE_BROADCAST_CAPACITY);

        Self {
            inner: Arc::new(ConnectionInner {
                endpoint: endpoint.to_owned(),
                outbound: RwLock::new(None),
                shared: Arc::new(Shared {
                    config,
                    adapter: Arc::new(adapter),
                    registry: Arc::new(ChannelRegistry::new()),
                    state_tx,
                    closed_tx,
                }),
            }),
        }
    }

    /// Connect using the configured heartbeat interval.
    pub async fn connect(&self) -> Result<()> {
        self.connect_with_heartbeat(self.inner.shared.config.heartbeat_interval)
            .await
    }

    /// Validate the endpoint, perform the handshake and start the session task.
    ///
    /// Fails with [`WsError::InvalidEndpoint`] before any network activity if the endpoint
    /// is not a `ws`/`wss` URI with a host, with [`WsError::AlreadyConnected`] if a session
    /// is open or opening, and with [`WsError::HandshakeFailed`] if the TCP, TLS or
    /// WebSocket handshake fails. On failure the state is back to `Disconnected`.
    ///
    /// The first heartbeat is sent one `heartbeat_interval` after the handshake completes.
    pub async fn connect_with_heartbeat(&self, heartbeat_interval: Duration) -> Result<()> {
        let endpoint = Endpoint::parse(&self.inner.endpoint)?;
        if heartbeat_interval.is_zero() {
            return Err(Error::validation("heartbeat interval must be greater than zero"));
        }
        if heartbeat_start(heartbeat_interval).is_none() {
            return Err(Error::validation(format!(
                "heartbeat interval {heartbeat_interval:?} is out of range"
            )));
        }

        let shared = &self.inner.shared;
        let claimed = shared.state_tx.send_if_modified(|state| {
            if matches!(state, ConnectionState::Disconnected) {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(WsError::AlreadyConnected.into());
        }

        // Puts the state back to Disconnected if the handshake fails or this future is dropped
        let mut connecting = ConnectingGuard {
            state_tx: &shared.state_tx,
            armed: true,
        };

        #[cfg(feature = "tracing")]
        tracing::info!(%endpoint, tls = endpoint.is_tls(), "Connecting");

        let ws_stream = handshake(&endpoint)
            .await
            .map_err(WsError::HandshakeFailed)?;
        let first_tick = heartbeat_start(heartbeat_interval)
            .ok_or_else(|| Error::validation("heartbeat interval is out of range"))?;

        let (outbound_tx, outbound_rx) = mpsc::channel(shared.config.outbound_capacity.max(1));
        *self
            .inner
            .outbound
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(outbound_tx);

        connecting.armed = false;
        shared.state_tx.send_replace(ConnectionState::Connected {
            since: Instant::now(),
        });

        #[cfg(feature = "tracing")]
        tracing::info!(%endpoint, ?heartbeat_interval, "Connected");

        let session = Arc::clone(shared);
        tokio::spawn(async move {
            session
                .run_session(ws_stream, outbound_rx, first_tick, heartbeat_interval)
                .await;
        });

        Ok(())
    }

    /// Send a close frame and wait for it to be written.
    ///
    /// Once the close frame is out, every channel subscription is dropped from the
    /// registry (their streams end) and the state becomes `Disconnected`. This never fires
    /// the unsolicited-disconnect signal.
    pub async fn disconnect(&self) -> Result<()> {
        let shared = &self.inner.shared;
        let claimed = shared.state_tx.send_if_modified(|state| {
            if state.is_connected() {
                *state = ConnectionState::Disconnecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(WsError::NotConnected.into());
        }

        #[cfg(feature = "tracing")]
        tracing::info!(endpoint = %self.inner.endpoint, "Disconnecting");

        let sender = self
            .inner
            .outbound
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let (ack_tx, ack_rx) = oneshot::channel();
        let delivered = match sender {
            Some(tx) => tx.send(Outbound::Close(ack_tx)).await.is_ok(),
            None => false,
        };
        let acknowledged = delivered && ack_rx.await.is_ok();

        if !acknowledged {
            // The session ended on its own while we were asking it to close. A newer session
            // may already own the state and the registry.
            shared.state_tx.send_if_modified(|state| {
                if matches!(state, ConnectionState::Disconnecting) {
                    shared.registry.clear();
                    *state = ConnectionState::Disconnected;
                    true
                } else {
                    false
                }
            });
        }

        Ok(())
    }

    /// Hand a text payload to the session task.
    ///
    /// Fails with [`WsError::NotConnected`] if there is no open session or the outbound
    /// queue is full. Delivery is not acknowledged.
    pub fn send(&self, payload: String) -> Result<()> {
        if !self.state().is_connected() {
            #[cfg(feature = "tracing")]
            tracing::warn!("WebSocket is not open, call connect first");
            return Err(WsError::NotConnected.into());
        }

        let guard = self
            .inner
            .outbound
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return Err(WsError::NotConnected.into());
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(%payload, "Sending message");

        tx.try_send(Outbound::Text(payload)).map_err(|e| {
            #[cfg(feature = "tracing")]
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::warn!("Cannot send data to WebSocket as it is not writable");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::warn!("WebSocket session has ended");
                }
            }
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
            WsError::NotConnected
        })?;

        Ok(())
    }

    /// Resolves with the next socket loss the caller did not request.
    ///
    /// The receiver is registered when this method is called, so a loss that happens after
    /// the call and before the first poll is still observed. `disconnect` never resolves it.
    pub fn on_unsolicited_disconnect(
        &self,
    ) -> impl Future<Output = Result<UnsolicitedClose>> + Send + use<A> {
        let mut rx = self.inner.shared.closed_tx.subscribe();

        async move {
            loop {
                match rx.recv().await {
                    Ok(close) => return Ok(close),
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return Err(WsError::NotConnected.into()),
                }
            }
        }
    }

    /// Receiver of every unsolicited socket loss, for callers that watch repeatedly.
    #[must_use]
    pub fn unsolicited_disconnects(&self) -> broadcast::Receiver<UnsolicitedClose> {
        self.inner.shared.closed_tx.subscribe()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.shared.state_tx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state_tx.subscribe()
    }

    /// Channel registry inbound messages are routed through.
    #[must_use]
    pub fn registry(&self) -> &ChannelRegistry<A::Message> {
        &self.inner.shared.registry
    }

    /// Protocol adapter this connection decodes and builds commands with.
    #[must_use]
    pub fn adapter(&self) -> &A {
        &self.inner.shared.adapter
    }

    /// Endpoint as given at construction.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }
}

struct ConnectingGuard<'state> {
    state_tx: &'state watch::Sender<ConnectionState>,
    armed: bool,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state_tx.send_replace(ConnectionState::Disconnected);
        }
    }
}

/// First heartbeat deadline, or `None` when the schedule would overflow the clock.
///
/// The timer computes each next deadline from the previous one, so two periods must fit.
fn heartbeat_start(heartbeat_interval: Duration) -> Option<Instant> {
    let first = Instant::now().checked_add(heartbeat_interval)?;
    first.checked_add(heartbeat_interval)?;
    Some(first)
}

/// Moves the state to `Disconnected` and reports an unsolicited close if the session task
/// stops without reaching its exit handling, e.g. when an adapter panics.
struct SessionGuard<'session, A: ProtocolAdapter> {
    shared: &'session Shared<A>,
    armed: bool,
}

impl<A: ProtocolAdapter> Drop for SessionGuard<'_, A> {
    fn drop(&mut self) {
        if self.armed {
            self.shared
                .close_unsolicited(UnsolicitedClose::new(None, "session task stopped"));
        }
    }
}

/// Open the TCP connection, negotiate TLS for `wss`, and upgrade to WebSocket.
async fn handshake(endpoint: &Endpoint) -> std::result::Result<WsStream, tungstenite::Error> {
    let connector = if endpoint.is_tls() {
        // Errs when a process-wide provider is already installed, which is fine
        _ = rustls::crypto::ring::default_provider().install_default();
        // None lets the TLS backend build a client config on the native root store
        None
    } else {
        Some(Connector::Plain)
    };

    let tcp = TcpStream::connect((endpoint.host(), endpoint.port())).await?;

    let (ws_stream, _response) =
        client_async_tls_with_config(endpoint.url().as_str(), tcp, None, connector).await?;

    Ok(ws_stream)
}

impl<A: ProtocolAdapter> Shared<A> {
    /// Drive one connection until it closes.
    async fn run_session(
        self: Arc<Self>,
        ws_stream: WsStream,
        mut outbound_rx: mpsc::Receiver<Outbound>,
        first_tick: Instant,
        heartbeat_interval: Duration,
    ) {
        let mut guard = SessionGuard {
            shared: &self,
            armed: true,
        };
        let router = MessageRouter::new(Arc::clone(&self.adapter), Arc::clone(&self.registry));
        let (mut write, mut read) = ws_stream.split();
        let mut heartbeat = interval_at(first_tick, heartbeat_interval);

        let end = loop {
            tokio::select! {
                // Handle incoming frames
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        router.route_frame(text.as_str());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let close = frame.map_or_else(
                            || UnsolicitedClose::new(None, "close frame without status"),
                            |f| UnsolicitedClose::new(Some(u16::from(f.code)), f.reason.as_str()),
                        );
                        break SessionEnd::Unsolicited(close);
                    }
                    Some(Ok(_)) => {
                        // Binary frames are not part of the text protocol; pings are answered
                        // by the transport.
                    }
                    Some(Err(e)) => {
                        break SessionEnd::Unsolicited(UnsolicitedClose::new(None, e.to_string()));
                    }
                    None => {
                        break SessionEnd::Unsolicited(UnsolicitedClose::new(None, "stream ended"));
                    }
                },

                // Handle commands from subscriptions and callers
                command = outbound_rx.recv() => match command {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            break SessionEnd::Unsolicited(UnsolicitedClose::new(None, e.to_string()));
                        }
                    }
                    Some(Outbound::Close(ack)) => {
                        if let Err(e) = write.close().await {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(error = %e, "Close frame could not be written cleanly");
                            #[cfg(not(feature = "tracing"))]
                            let _ = &e;
                        }
                        break SessionEnd::Requested(ack);
                    }
                    None => break SessionEnd::Abandoned,
                },

                _ = heartbeat.tick() => {
                    if !self.state_tx.borrow().is_connected() {
                        continue;
                    }
                    let ping = Message::Text(self.config.heartbeat_payload.clone().into());
                    if let Err(e) = write.send(ping).await {
                        break SessionEnd::Unsolicited(UnsolicitedClose::new(None, e.to_string()));
                    }
                }
            }
        };
        guard.armed = false;

        match end {
            SessionEnd::Requested(ack) => {
                self.registry.clear();
                self.state_tx.send_replace(ConnectionState::Disconnected);
                #[cfg(feature = "tracing")]
                tracing::info!("Disconnected");
                _ = ack.send(());
            }
            SessionEnd::Unsolicited(close) => self.close_unsolicited(close),
            SessionEnd::Abandoned => {
                _ = write.close().await;
                self.registry.clear();
                self.state_tx.send_replace(ConnectionState::Disconnected);
            }
        }
    }

    fn close_unsolicited(&self, close: UnsolicitedClose) {
        // Block sends and connects while subscriptions are settled
        self.state_tx.send_replace(ConnectionState::Disconnecting);
        #[cfg(feature = "tracing")]
        tracing::warn!(%close, "WebSocket closed without a disconnect request");

        if self.config.fail_subscriptions_on_close {
            self.fail_subscriptions(&close);
        }

        self.state_tx.send_replace(ConnectionState::Disconnected);
        _ = self.closed_tx.send(close);
    }

    /// Push the close to every registered stream once, then drop all entries.
    fn fail_subscriptions(&self, close: &UnsolicitedClose) {
        let mut notified = Vec::new();
        for (_channel, sink) in self.registry.drain() {
            if notified.iter().any(|seen| sink.same_stream(seen)) {
                continue;
            }
            sink.error(WsError::UnsolicitedClose(close.clone()));
            notified.push(sink);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoAdapter;

    impl ProtocolAdapter for EchoAdapter {
        type Message = String;

        fn decode_inbound(&self, frame: &str) -> Result<Vec<String>> {
            Ok(vec![frame.to_owned()])
        }

        fn channel_key(&self, message: &String) -> Result<String> {
            Ok(message.clone())
        }

        fn subscribe_command(&self, channel: &str, _params: &[String]) -> Result<String> {
            Ok(channel.to_owned())
        }

        fn unsubscribe_command(&self, channel: &str) -> Result<String> {
            Ok(channel.to_owned())
        }
    }

    #[test]
    fn state_is_connected_only_when_connected() {
        assert!(
            ConnectionState::Connected {
                since: Instant::now()
            }
            .is_connected()
        );
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Disconnecting.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected());
    }

    #[test]
    fn state_display_uses_variant_name() {
        assert_eq!(ConnectionState::Disconnecting.to_string(), "Disconnecting");
    }

    #[test]
    fn send_before_connect_fails_with_not_connected() {
        let connection = ConnectionManager::new("ws://localhost:1", Config::default(), EchoAdapter);

        let error = connection.send("ping".to_owned()).unwrap_err();
        assert!(matches!(error.ws_error(), Some(WsError::NotConnected)));
    }

    #[tokio::test]
    async fn connect_rejects_unsupported_scheme_before_network() {
        let connection =
            ConnectionManager::new("https://localhost:1", Config::default(), EchoAdapter);

        let error = connection.connect().await.unwrap_err();
        assert!(matches!(error.ws_error(), Some(WsError::InvalidEndpoint(_))));
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_rejects_zero_heartbeat() {
        let connection = ConnectionManager::new("ws://localhost:1", Config::default(), EchoAdapter);

        let error = connection
            .connect_with_heartbeat(Duration::ZERO)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), crate::error::Kind::Validation);
    }

    #[tokio::test]
    async fn connect_rejects_heartbeat_past_the_clock() {
        let connection = ConnectionManager::new("ws://localhost:1", Config::default(), EchoAdapter);

        let error = connection
            .connect_with_heartbeat(Duration::MAX)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), crate::error::Kind::Validation);
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn heartbeat_start_needs_two_periods() {
        assert!(heartbeat_start(Duration::from_secs(60)).is_some());
        assert!(heartbeat_start(Duration::MAX).is_none());
        assert!(heartbeat_start(Duration::MAX / 2).is_none());
    }

    #[tokio::test]
    async fn failed_disconnect_leaves_newer_session_alone() {
        let connection = ConnectionManager::new("ws://localhost:1", Config::default(), EchoAdapter);
        let (tx, mut rx) = mpsc::channel(1);
        *connection.inner.outbound.write().unwrap() = Some(tx);
        connection.inner.shared.state_tx.send_replace(ConnectionState::Connected {
            since: Instant::now(),
        });

        let racing = connection.clone();
        let session = tokio::spawn(async move {
            let Some(Outbound::Close(ack)) = rx.recv().await else {
                panic!("expected a close request");
            };
            // The old session dies and a new one comes up before the ack
            let (sink, sink_rx) = crate::ws::registry::ChannelSink::channel();
            racing.registry().put("fresh", sink);
            racing
                .inner
                .shared
                .state_tx
                .send_replace(ConnectionState::Connected {
                    since: Instant::now(),
                });
            drop(ack);
            sink_rx
        });

        connection.disconnect().await.unwrap();
        let sink_rx = session.await.unwrap();

        assert!(connection.state().is_connected());
        assert!(connection.registry().contains("fresh"));
        drop(sink_rx);
    }

    #[tokio::test]
    async fn failed_disconnect_resets_dead_session() {
        let connection = ConnectionManager::new("ws://localhost:1", Config::default(), EchoAdapter);
        let (sink, sink_rx) = crate::ws::registry::ChannelSink::channel();
        connection.registry().put("stale", sink);
        connection.inner.shared.state_tx.send_replace(ConnectionState::Connected {
            since: Instant::now(),
        });

        connection.disconnect().await.unwrap();

        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(connection.registry().is_empty());
        drop(sink_rx);
    }

    #[tokio::test]
    async fn disconnect_without_session_fails() {
        let connection = ConnectionManager::new("ws://localhost:1", Config::default(), EchoAdapter);

        let error = connection.disconnect().await.unwrap_err();
        assert!(matches!(error.ws_error(), Some(WsError::NotConnected)));
    }
}
