#![expect(
    clippy::module_name_repetitions,
    reason = "Re-exported names intentionally match their modules for API clarity"
)]

//! OkCoin / OkEx v1 streaming client.
//!
//! **Feature flag:** `okcoin` (required to use this module)
//!
//! Plugs [`OkCoinAdapter`] into the generic [`ws`](crate::ws) engine and adds typed
//! subscriptions for the public futures and spot channels, plus login and the private
//! futures account batch.
//!
//! # Wire format
//!
//! - Subscribe: `{"event":"addChannel","channel":"<name>"}`, with
//!   `"parameters":{"api_key":..,"sign":..}` for private channels
//! - Unsubscribe: `{"event":"removeChannel","channel":"<name>"}`
//! - Inbound: `[{"channel":"<name>","data":{..}}, ..]`
//! - Heartbeat: `{"event":"ping"}` answered by `{"event":"pong"}`
//!
//! # Example
//!
//! ```rust, no_run
//! use futures::StreamExt as _;
//! use xstream::okcoin::Client;
//! use xstream::okcoin::types::Tool;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::default();
//!     client.connect().await?;
//!
//!     let mut index = Box::pin(client.subscribe_future_index(Tool::Btc));
//!     while let Some(index) = index.next().await {
//!         println!("BTC index: {}", index?.index);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod client;
pub mod types;

pub use adapter::OkCoinAdapter;
pub use client::{Client, DEFAULT_ENDPOINT};
pub use types::request::Credentials;
pub use types::response::OkCoinMessage;
