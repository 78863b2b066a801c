#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use bon::Builder;

const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_HEARTBEAT_PAYLOAD: &str = "ping";
const DEFAULT_OUTBOUND_CAPACITY: usize = 1024;

/// Configuration for WebSocket client behavior.
///
/// ```
/// use std::time::Duration;
/// use xstream::ws::config::Config;
///
/// let config = Config::builder()
///     .heartbeat_interval(Duration::from_secs(30))
///     .fail_subscriptions_on_close(true)
///     .build();
/// assert_eq!(config.heartbeat_payload, "ping");
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Interval between heartbeat payloads once connected
    #[builder(default = DEFAULT_HEARTBEAT_INTERVAL_DURATION)]
    pub heartbeat_interval: Duration,
    /// Text payload sent on every heartbeat tick
    #[builder(into, default = DEFAULT_HEARTBEAT_PAYLOAD.to_owned())]
    pub heartbeat_payload: String,
    /// Number of outbound frames that may wait for the socket before sends are refused.
    ///
    /// A full queue means the transport is not writable and `send` fails with
    /// [`NotConnected`](crate::ws::WsError::NotConnected).
    #[builder(default = DEFAULT_OUTBOUND_CAPACITY)]
    pub outbound_capacity: usize,
    /// Fail and drop every registered subscription when the peer closes the socket.
    ///
    /// Off by default: subscriptions stay registered and silently stop receiving data
    /// until the caller disconnects or cancels them.
    #[builder(default)]
    pub fail_subscriptions_on_close: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}
