//! Core traits for generic WebSocket infrastructure.

use std::fmt::Debug;

use super::error::WsError;

/// Protocol-specific collaborator plugged into the connection engine.
///
/// The engine never looks inside a message: it asks the adapter to decode frames, to name
/// the channel a message belongs to, and to build the subscribe/unsubscribe commands it
/// writes to the socket.
///
/// # Example
///
/// ```ignore
/// pub struct LineAdapter;
///
/// impl ProtocolAdapter for LineAdapter {
///     type Message = String;
///
///     fn decode_inbound(&self, frame: &str) -> crate::Result<Vec<String>> {
///         Ok(vec![frame.to_owned()])
///     }
///
///     fn channel_key(&self, message: &String) -> crate::Result<String> {
///         message
///             .split_once(' ')
///             .map(|(channel, _)| channel.to_owned())
///             .ok_or_else(|| WsError::ChannelDecode(message.clone()).into())
///     }
///
///     fn subscribe_command(&self, channel: &str, _params: &[String]) -> crate::Result<String> {
///         Ok(format!("SUB {channel}"))
///     }
///
///     fn unsubscribe_command(&self, channel: &str) -> crate::Result<String> {
///         Ok(format!("UNSUB {channel}"))
///     }
/// }
/// ```
pub trait ProtocolAdapter: Send + Sync + 'static {
    /// Decoded unit of protocol data delivered to subscribers.
    type Message: Debug + Send + 'static;

    /// Decode one text frame.
    ///
    /// A frame may carry several messages, or none (keepalive replies and similar).
    fn decode_inbound(&self, frame: &str) -> crate::Result<Vec<Self::Message>>;

    /// Channel key a decoded message is routed by.
    fn channel_key(&self, message: &Self::Message) -> crate::Result<String>;

    /// Command that subscribes to `channel`.
    fn subscribe_command(&self, channel: &str, params: &[String]) -> crate::Result<String>;

    /// Command that unsubscribes from `channel`.
    fn unsubscribe_command(&self, channel: &str) -> crate::Result<String>;

    /// Protocol-level error carried by an otherwise routable message.
    ///
    /// When this returns `Some`, the error is delivered to the channel's stream in place
    /// of the message.
    fn channel_error(&self, _message: &Self::Message) -> Option<WsError> {
        None
    }
}
