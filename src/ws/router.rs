#![expect(
    clippy::module_name_repetitions,
    reason = "Router types include the module name for clarity"
)]

use std::sync::Arc;

use super::error::WsError;
use super::registry::ChannelRegistry;
use super::traits::ProtocolAdapter;

/// Outcome of routing a single decoded message.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Value pushed to the subscription's stream
    Delivered,
    /// Channel-scoped error pushed to the subscription's stream
    Failed,
    /// No subscription is registered for the message's channel
    Unroutable,
    /// The adapter could not name the message's channel
    Undecodable,
}

/// Routes decoded inbound messages to the subscription registered for their channel.
///
/// Runs on the connection task, so messages are routed in the order frames arrive. Nothing
/// here can fail the connection: undecodable and unroutable messages are dropped.
pub struct MessageRouter<A: ProtocolAdapter> {
    adapter: Arc<A>,
    registry: Arc<ChannelRegistry<A::Message>>,
}

impl<A: ProtocolAdapter> MessageRouter<A> {
    #[must_use]
    pub fn new(adapter: Arc<A>, registry: Arc<ChannelRegistry<A::Message>>) -> Self {
        Self { adapter, registry }
    }

    /// Decode a text frame and route every message it carries.
    ///
    /// Returns the number of messages delivered to a subscriber (values or errors).
    pub fn route_frame(&self, frame: &str) -> usize {
        #[cfg(feature = "tracing")]
        tracing::trace!(%frame, "Received WebSocket text frame");

        match self.adapter.decode_inbound(frame) {
            Ok(messages) => messages
                .into_iter()
                .map(|message| self.route(message))
                .filter(|delivery| matches!(delivery, Delivery::Delivered | Delivery::Failed))
                .count(),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%frame, error = %e, "Failed to decode WebSocket frame");
                #[cfg(not(feature = "tracing"))]
                let _ = (&frame, &e);
                0
            }
        }
    }

    /// Route one decoded message.
    pub fn route(&self, message: A::Message) -> Delivery {
        let channel = match self.adapter.channel_key(&message) {
            Ok(channel) => channel,
            Err(e) => {
                let error = WsError::ChannelDecode(e.to_string());
                #[cfg(feature = "tracing")]
                tracing::error!(?message, %error, "Cannot parse channel from message");
                #[cfg(not(feature = "tracing"))]
                let _ = (&message, &error);
                return Delivery::Undecodable;
            }
        };

        let Some(sink) = self.registry.get(&channel) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(%channel, "No subscriber for channel");
            return Delivery::Unroutable;
        };

        if let Some(error) = self.adapter.channel_error(&message) {
            #[cfg(feature = "tracing")]
            tracing::warn!(%channel, %error, "Channel reported an error");
            sink.error(error);
            return Delivery::Failed;
        }

        if !sink.next(message) {
            #[cfg(feature = "tracing")]
            tracing::debug!(%channel, "Subscriber dropped before delivery");
        }

        Delivery::Delivered
    }
}
