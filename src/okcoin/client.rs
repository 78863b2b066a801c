use std::future::Future;

use futures::Stream;
use futures::StreamExt as _;

use super::adapter::OkCoinAdapter;
use super::types::request::{Credentials, Request};
use super::types::response::{Depth, FutureIndex, LoginResult, OkCoinMessage, Ticker};
use super::types::{
    DepthLevel, FuturesContract, LOGIN_CHANNEL, PING_PAYLOAD, PRIVATE_CHANNELS, Tool,
    USER_INFO_CHANNEL,
    futures_depth_channel, futures_index_channel, futures_ticker_channel, spot_depth_channel,
    spot_ticker_channel,
};
use crate::Result;
use crate::error::Error;
use crate::ws;
use crate::ws::config::Config;
use crate::ws::connection::ConnectionState;
use crate::ws::{ChannelStream, UnsolicitedClose};

/// Production endpoint of the v1 streaming API.
pub const DEFAULT_ENDPOINT: &str = "wss://real.okcoin.com:10440/websocket/okcoinapi";

/// Streaming client for OkCoin / OkEx v1 market and account data.
///
/// # Examples
///
/// ```rust, no_run
/// use futures::StreamExt as _;
/// use xstream::okcoin::Client;
/// use xstream::okcoin::types::{FuturesContract, Tool};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = Client::default();
///     client.connect().await?;
///
///     let mut ticker = Box::pin(client.subscribe_futures_ticker(Tool::Btc, FuturesContract::Quarter));
///     while let Some(ticker) = ticker.next().await {
///         println!("last: {}", ticker?.last);
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    inner: ws::Client<OkCoinAdapter>,
    credentials: Option<Credentials>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT, Self::default_config())
    }
}

impl Client {
    /// Create a disconnected client for `endpoint`.
    #[must_use]
    pub fn new(endpoint: &str, config: Config) -> Self {
        Self {
            inner: ws::Client::new(endpoint, config, OkCoinAdapter),
            credentials: None,
        }
    }

    /// Default configuration with the server's `{"event":"ping"}` heartbeat.
    #[must_use]
    pub fn default_config() -> Config {
        Config::builder()
            .heartbeat_payload(PING_PAYLOAD)
            .build()
    }

    /// Attach credentials for [`Self::login`] and [`Self::subscribe_private_data`].
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub async fn connect(&self) -> Result<()> {
        self.inner.connect().await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.inner.disconnect().await
    }

    /// Resolves with the next socket loss that was not caused by [`Self::disconnect`].
    pub fn on_unsolicited_disconnect(
        &self,
    ) -> impl Future<Output = Result<UnsolicitedClose>> + Send + use<> {
        self.inner.on_unsolicited_disconnect()
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection_state()
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscription_count()
    }

    /// Underlying channel client, for raw subscriptions and sends.
    #[must_use]
    pub fn channels(&self) -> &ws::Client<OkCoinAdapter> {
        &self.inner
    }

    /// Subscribe to a channel by name and receive raw messages.
    pub fn subscribe_channel(&self, channel: &str) -> ChannelStream<OkCoinMessage> {
        self.inner.subscribe(channel, &[])
    }

    /// Futures order book, `ok_sub_futureusd_{tool}_depth_{contract}_{depth}`.
    ///
    /// Futures depth channels only accept [`DepthLevel::Twenty`] and [`DepthLevel::Sixty`].
    pub fn subscribe_futures_depth(
        &self,
        tool: Tool,
        contract: FuturesContract,
        depth: DepthLevel,
    ) -> impl Stream<Item = Result<Depth>> + Send + use<> {
        let channel = futures_depth_channel(tool, contract, depth);
        typed(self.inner.subscribe(&channel, &[]))
    }

    /// Futures ticker, `ok_sub_futureusd_{tool}_ticker_{contract}`.
    pub fn subscribe_futures_ticker(
        &self,
        tool: Tool,
        contract: FuturesContract,
    ) -> impl Stream<Item = Result<Ticker>> + Send + use<> {
        let channel = futures_ticker_channel(tool, contract);
        typed(self.inner.subscribe(&channel, &[]))
    }

    /// Futures index, `ok_sub_futureusd_{tool}_index`.
    pub fn subscribe_future_index(
        &self,
        tool: Tool,
    ) -> impl Stream<Item = Result<FutureIndex>> + Send + use<> {
        let channel = futures_index_channel(tool);
        typed(self.inner.subscribe(&channel, &[]))
    }

    /// Spot ticker for `base`/`quote`, e.g. `("btc", "usd")`.
    pub fn subscribe_spot_ticker(
        &self,
        base: &str,
        quote: &str,
    ) -> impl Stream<Item = Result<Ticker>> + Send + use<> {
        let channel = spot_ticker_channel(base, quote);
        typed(self.inner.subscribe(&channel, &[]))
    }

    /// Spot order book for `base`/`quote`.
    pub fn subscribe_spot_depth(
        &self,
        base: &str,
        quote: &str,
        depth: DepthLevel,
    ) -> impl Stream<Item = Result<Depth>> + Send + use<> {
        let channel = spot_depth_channel(base, quote, depth);
        typed(self.inner.subscribe(&channel, &[]))
    }

    /// Send the login request and stream its reply.
    ///
    /// A rejected login arrives as a [`ws::WsError::ChannelError`] item.
    pub fn login(&self) -> Result<impl Stream<Item = Result<LoginResult>> + Send + use<>> {
        let command = Request::login(self.require_credentials()?).to_json()?;
        Ok(typed(self.inner.send_and_subscribe(command, LOGIN_CHANNEL)))
    }

    /// Subscribe to futures account info, positions and trades with one request.
    ///
    /// Messages from all three channels arrive on the returned stream; tell them apart by
    /// [`OkCoinMessage::channel`].
    pub fn subscribe_private_data(&self) -> Result<ChannelStream<OkCoinMessage>> {
        let params = self.require_credentials()?.params();
        let internal: Vec<String> = PRIVATE_CHANNELS.iter().map(|&c| c.to_owned()).collect();

        Ok(self
            .inner
            .subscribe_batch(USER_INFO_CHANNEL, &internal, &params))
    }

    fn require_credentials(&self) -> Result<&Credentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| Error::validation("credentials are required for private channels"))
    }
}

fn typed<T: serde::de::DeserializeOwned>(
    stream: ChannelStream<OkCoinMessage>,
) -> impl Stream<Item = Result<T>> + Send {
    stream.map(|message| message.and_then(|m| m.data_as::<T>()))
}
