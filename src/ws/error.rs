#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// Details about a socket loss the caller did not ask for.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsolicitedClose {
    /// Close code sent by the peer, when the peer sent a close frame
    pub code: Option<u16>,
    /// Close reason from the peer, or the transport error description
    pub reason: String,
}

impl UnsolicitedClose {
    #[must_use]
    pub fn new<S: Into<String>>(code: Option<u16>, reason: S) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for UnsolicitedClose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "connection closed by peer ({code}): {}", self.reason),
            None => write!(f, "connection lost: {}", self.reason),
        }
    }
}

impl StdError for UnsolicitedClose {}

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Endpoint is malformed, uses a scheme other than ws/wss, or has no host
    InvalidEndpoint(String),
    /// TCP connect, TLS negotiation or the WebSocket upgrade failed
    HandshakeFailed(tokio_tungstenite::tungstenite::Error),
    /// Attempted to send while the connection is absent, closing or not writable
    NotConnected,
    /// Attempted to connect while a session is already open or opening
    AlreadyConnected,
    /// Error communicating with the WebSocket server after the handshake
    Connection(tokio_tungstenite::tungstenite::Error),
    /// Adapter failed to decode a frame or extract a channel key from a message
    ChannelDecode(String),
    /// Server reported an error for a single channel
    ChannelError {
        /// Channel the error is scoped to
        channel: String,
        /// Server-provided description
        reason: String,
    },
    /// The socket was closed without a disconnect request
    UnsolicitedClose(UnsolicitedClose),
    /// Error parsing or building a WebSocket message
    MessageParse(serde_json::Error),
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEndpoint(reason) => write!(f, "Invalid WebSocket endpoint: {reason}"),
            Self::HandshakeFailed(e) => write!(f, "WebSocket handshake failed: {e}"),
            Self::NotConnected => write!(f, "WebSocket is not connected"),
            Self::AlreadyConnected => write!(f, "WebSocket is already connected"),
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::ChannelDecode(reason) => write!(f, "Failed to decode channel message: {reason}"),
            Self::ChannelError { channel, reason } => {
                write!(f, "Channel {channel} reported an error: {reason}")
            }
            Self::UnsolicitedClose(close) => write!(f, "WebSocket {close}"),
            Self::MessageParse(e) => write!(f, "Failed to parse WebSocket message: {e}"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::HandshakeFailed(e) | Self::Connection(e) => Some(e),
            Self::MessageParse(e) => Some(e),
            Self::UnsolicitedClose(close) => Some(close),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, WsError::Connection(e))
    }
}
