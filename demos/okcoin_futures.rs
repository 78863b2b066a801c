//! OkCoin futures market data explorer.
//!
//! This demo exercises the streaming client end to end:
//! 1. Connecting and watching for unsolicited disconnects
//! 2. Subscribing to the BTC quarterly ticker and the BTC futures index
//! 3. Subscribing to the 20-level order book and printing the top of book
//! 4. Cancelling a subscription and disconnecting
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info cargo run --example okcoin_futures --features okcoin,tracing
//! ```

use std::time::Duration;

use futures::StreamExt as _;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use xstream::okcoin::Client;
use xstream::okcoin::types::{DepthLevel, FuturesContract, Tool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let client = Client::default();
    client.connect().await?;
    info!(state = %client.connection_state(), "Connected");

    let lost = client.on_unsolicited_disconnect();
    tokio::spawn(async move {
        if let Ok(close) = lost.await {
            warn!(%close, "Connection lost");
        }
    });

    let mut ticker = Box::pin(client.subscribe_futures_ticker(Tool::Btc, FuturesContract::Quarter));
    let mut index = Box::pin(client.subscribe_future_index(Tool::Btc));

    for _ in 0..3 {
        match timeout(Duration::from_secs(10), ticker.next()).await {
            Ok(Some(Ok(ticker))) => info!(
                stream = "ticker",
                last = %ticker.last,
                bid = %ticker.buy,
                ask = %ticker.sell
            ),
            Ok(Some(Err(e))) => debug!(stream = "ticker", error = %e),
            Ok(None) | Err(_) => break,
        }

        if let Ok(Some(Ok(index))) = timeout(Duration::from_secs(10), index.next()).await {
            info!(stream = "index", index = %index.index, timestamp = index.timestamp);
        }
    }

    let depth = client.subscribe_futures_depth(Tool::Btc, FuturesContract::Quarter, DepthLevel::Twenty);
    let mut depth = Box::pin(depth);
    if let Ok(Some(Ok(book))) = timeout(Duration::from_secs(10), depth.next()).await {
        info!(
            stream = "depth",
            best_bid = ?book.best_bid().map(|level| level.price),
            best_ask = ?book.best_ask().map(|level| level.price)
        );
    }

    // Dropping a stream cancels its subscription
    drop(depth);
    info!(subscriptions = client.subscription_count());

    client.disconnect().await?;
    info!(state = %client.connection_state(), "Disconnected");

    Ok(())
}
