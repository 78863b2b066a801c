use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use super::config::Config;
use super::connection::{ConnectionManager, ConnectionState};
use super::error::UnsolicitedClose;
use super::subscription::{ChannelStream, SubscriptionManager};
use super::traits::ProtocolAdapter;
use crate::Result;

/// Channel streaming client over one multiplexed WebSocket connection.
///
/// Bundles a [`ConnectionManager`] and a [`SubscriptionManager`] for one protocol adapter.
/// Cloning is cheap and every clone drives the same connection.
///
/// # Examples
///
/// ```rust, no_run
/// use futures::StreamExt as _;
/// use xstream::ws::{Client, ProtocolAdapter};
/// use xstream::ws::config::Config;
///
/// struct Lines;
///
/// impl ProtocolAdapter for Lines {
///     type Message = String;
///
///     fn decode_inbound(&self, frame: &str) -> xstream::Result<Vec<String>> {
///         Ok(frame.lines().map(str::to_owned).collect())
///     }
///
///     fn channel_key(&self, message: &String) -> xstream::Result<String> {
///         Ok(message.split(' ').next().unwrap_or_default().to_owned())
///     }
///
///     fn subscribe_command(&self, channel: &str, _: &[String]) -> xstream::Result<String> {
///         Ok(format!("SUB {channel}"))
///     }
///
///     fn unsubscribe_command(&self, channel: &str) -> xstream::Result<String> {
///         Ok(format!("UNSUB {channel}"))
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = Client::new("wss://stream.example.com/ws", Config::default(), Lines);
///     client.connect().await?;
///
///     let mut trades = client.subscribe("trades", &[]);
///     while let Some(line) = trades.next().await {
///         println!("{}", line?);
///     }
///
///     Ok(())
/// }
/// ```
pub struct Client<A: ProtocolAdapter> {
    inner: Arc<ClientInner<A>>,
}

struct ClientInner<A: ProtocolAdapter> {
    connection: ConnectionManager<A>,
    subscriptions: SubscriptionManager<A>,
}

impl<A: ProtocolAdapter> Clone for Client<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: ProtocolAdapter> fmt::Debug for Client<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("connection", &self.inner.connection)
            .finish_non_exhaustive()
    }
}

impl<A: ProtocolAdapter> Client<A> {
    /// Create a disconnected client for `endpoint`.
    #[must_use]
    pub fn new(endpoint: &str, config: Config, adapter: A) -> Self {
        let connection = ConnectionManager::new(endpoint, config, adapter);
        let subscriptions = SubscriptionManager::new(connection.clone());

        Self {
            inner: Arc::new(ClientInner {
                connection,
                subscriptions,
            }),
        }
    }

    /// Open the connection. See [`ConnectionManager::connect_with_heartbeat`].
    pub async fn connect(&self) -> Result<()> {
        self.inner.connection.connect().await
    }

    /// Open the connection with a heartbeat interval other than the configured one.
    pub async fn connect_with_heartbeat(&self, heartbeat_interval: Duration) -> Result<()> {
        self.inner
            .connection
            .connect_with_heartbeat(heartbeat_interval)
            .await
    }

    /// Close the connection and drop every subscription.
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.connection.disconnect().await
    }

    /// Write a raw text payload.
    pub fn send(&self, payload: String) -> Result<()> {
        self.inner.connection.send(payload)
    }

    /// Subscribe to one channel.
    pub fn subscribe(&self, channel: &str, params: &[String]) -> ChannelStream<A::Message> {
        self.inner.subscriptions.subscribe(channel, params)
    }

    /// Subscribe one stream to several channel keys under one external channel name.
    pub fn subscribe_batch(
        &self,
        external: &str,
        internal: &[String],
        params: &[String],
    ) -> ChannelStream<A::Message> {
        self.inner
            .subscriptions
            .subscribe_batch(external, internal, params)
    }

    /// Write `command` verbatim and stream the replies arriving on `channel`.
    pub fn send_and_subscribe(&self, command: String, channel: &str) -> ChannelStream<A::Message> {
        self.inner.subscriptions.send_and_subscribe(command, channel)
    }

    /// Resolves with the next socket loss that was not caused by [`Self::disconnect`].
    pub fn on_unsolicited_disconnect(
        &self,
    ) -> impl Future<Output = Result<UnsolicitedClose>> + Send + use<A> {
        self.inner.connection.on_unsolicited_disconnect()
    }

    /// Receiver of every unsolicited socket loss.
    #[must_use]
    pub fn unsolicited_disconnects(&self) -> broadcast::Receiver<UnsolicitedClose> {
        self.inner.connection.unsolicited_disconnects()
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.state_receiver()
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.subscription_count()
    }

    #[must_use]
    pub fn active_channels(&self) -> Vec<String> {
        self.inner.subscriptions.active_channels()
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.inner.connection.endpoint()
    }

    #[must_use]
    pub fn adapter(&self) -> &A {
        self.inner.connection.adapter()
    }
}
