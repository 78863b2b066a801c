use serde_json::Value;

use super::types::LOGIN_CHANNEL;
use super::types::request::Request;
use super::types::response::OkCoinMessage;
use crate::Result;
use crate::error::Error;
use crate::ws::{ProtocolAdapter, WsError};

/// Adapter for the OkCoin / OkEx v1 WebSocket API.
///
/// Subscribe parameters are either empty (public channels) or `[api_key, sign]` (private
/// channels).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct OkCoinAdapter;

impl ProtocolAdapter for OkCoinAdapter {
    type Message = OkCoinMessage;

    fn decode_inbound(&self, frame: &str) -> Result<Vec<OkCoinMessage>> {
        let value: Value = serde_json::from_str(frame).map_err(WsError::MessageParse)?;
        let items = match value {
            Value::Array(items) => items,
            other => vec![other],
        };

        items
            .into_iter()
            .filter(|item| !OkCoinMessage::is_pong(item))
            .map(|item| {
                serde_json::from_value::<OkCoinMessage>(item)
                    .map_err(|e| Error::from(WsError::MessageParse(e)))
            })
            .collect()
    }

    fn channel_key(&self, message: &OkCoinMessage) -> Result<String> {
        if message.channel.is_empty() {
            return Err(WsError::ChannelDecode(format!(
                "message without channel: {}",
                message.data
            ))
            .into());
        }
        Ok(message.channel.clone())
    }

    fn subscribe_command(&self, channel: &str, params: &[String]) -> Result<String> {
        let request = match params {
            [] => Request::add_channel(channel),
            [api_key, sign] => {
                Request::add_channel(channel).with_parameters(api_key.clone(), sign.clone())
            }
            _ => {
                return Err(Error::validation(format!(
                    "expected no parameters or [api_key, sign], got {} parameters",
                    params.len()
                )));
            }
        };

        request.to_json()
    }

    fn unsubscribe_command(&self, channel: &str) -> Result<String> {
        if channel == LOGIN_CHANNEL {
            return Err(Error::validation("login has no unsubscribe request"));
        }

        Request::remove_channel(channel).to_json()
    }

    fn channel_error(&self, message: &OkCoinMessage) -> Option<WsError> {
        message.rejection().map(|reason| WsError::ChannelError {
            channel: message.channel.clone(),
            reason,
        })
    }
}
