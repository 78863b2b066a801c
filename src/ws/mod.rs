//! Core WebSocket infrastructure.
//!
//! One physical connection carries any number of logical channel subscriptions. Everything
//! protocol-specific is supplied by a [`ProtocolAdapter`], so the same engine drives any
//! text-framed channel protocol.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: owns the socket, the heartbeat and the unsolicited-close signal
//! - [`ChannelRegistry`]: concurrent map from channel key to subscriber sink
//! - [`MessageRouter`]: decodes frames with the adapter and dispatches by channel key
//! - [`SubscriptionManager`]: registers subscribers and hands back [`ChannelStream`]s
//! - [`Client`]: bundles the above for one adapter
//!
//! # Example
//!
//! ```ignore
//! let client = Client::new(endpoint, Config::default(), MyAdapter);
//! client.connect().await?;
//!
//! let mut ticker = client.subscribe("ticker.BTC-USD", &[]);
//! while let Some(message) = ticker.next().await {
//!     println!("{:?}", message?);
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod registry;
pub mod router;
pub mod subscription;
pub mod traits;

pub use client::Client;
pub use connection::{ConnectionManager, ConnectionState};
pub use endpoint::Endpoint;
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::{UnsolicitedClose, WsError};
pub use registry::{ChannelRegistry, ChannelSink};
pub use router::{Delivery, MessageRouter};
pub use subscription::{CancelHandle, ChannelStream, SubscriptionManager};
pub use traits::*;
