use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DisplayFromStr, PickFirst, serde_as};

use crate::Result;
use crate::ws::WsError;

/// One inbound message.
///
/// Frames are a JSON array of these (or a single object); each carries the channel it belongs
/// to and a channel-specific `data` payload.
#[non_exhaustive]
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OkCoinMessage {
    /// Channel the message belongs to
    #[serde(default)]
    pub channel: String,
    /// Channel-specific payload
    #[serde(default)]
    pub data: Value,
    /// Error code reported next to `data` by some rejections
    #[serde(default, alias = "errorcode", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<Value>,
}

impl OkCoinMessage {
    /// Deserialize the payload into `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| WsError::MessageParse(e).into())
    }

    /// Reason the server rejected the request behind this message, if it did.
    ///
    /// A message is a rejection when it carries an `error_code` (top level or inside `data`)
    /// or when `data.result` is `false`.
    #[must_use]
    pub fn rejection(&self) -> Option<String> {
        let code = self
            .error_code
            .as_ref()
            .or_else(|| self.data.get("error_code"))
            .filter(|code| !code.is_null());
        if let Some(code) = code {
            return Some(match code {
                Value::String(code) => format!("error code {code}"),
                other => format!("error code {other}"),
            });
        }

        match self.data.get("result") {
            Some(Value::Bool(false)) => Some("request rejected".to_owned()),
            Some(Value::String(result)) if result == "false" => {
                Some("request rejected".to_owned())
            }
            _ => None,
        }
    }

    /// Try to extract the payload as a ticker (spot or futures).
    #[must_use]
    pub fn as_ticker(&self) -> Option<Ticker> {
        if self.channel.ends_with("_ticker") || self.channel.contains("_ticker_") {
            self.data_as().ok()
        } else {
            None
        }
    }

    /// Try to extract the payload as an order book snapshot.
    #[must_use]
    pub fn as_depth(&self) -> Option<Depth> {
        if self.channel.contains("_depth") {
            self.data_as().ok()
        } else {
            None
        }
    }

    /// Try to extract the payload as a futures index update.
    #[must_use]
    pub fn as_future_index(&self) -> Option<FutureIndex> {
        if self.channel.ends_with("_index") {
            self.data_as().ok()
        } else {
            None
        }
    }

    /// Try to extract the payload as a login reply.
    #[must_use]
    pub fn as_login(&self) -> Option<LoginResult> {
        if self.channel == super::LOGIN_CHANNEL {
            self.data_as().ok()
        } else {
            None
        }
    }

    /// Heartbeat replies carry no channel and are not routed.
    #[must_use]
    pub fn is_pong(value: &Value) -> bool {
        value.get("event").and_then(Value::as_str) == Some("pong")
    }
}

/// Ticker payload. Futures tickers add contract limits and open interest.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Ticker {
    pub last: Decimal,
    pub buy: Decimal,
    pub sell: Decimal,
    #[serde(default)]
    pub high: Option<Decimal>,
    #[serde(default)]
    pub low: Option<Decimal>,
    pub vol: Decimal,
    /// Futures only: upper price limit
    #[serde(default, rename = "limitHigh")]
    pub limit_high: Option<Decimal>,
    /// Futures only: lower price limit
    #[serde(default, rename = "limitLow")]
    pub limit_low: Option<Decimal>,
    /// Futures only: open interest
    #[serde(default)]
    pub hold_amount: Option<Decimal>,
    /// Futures only: USD value of one contract
    #[serde(default, rename = "unitAmount")]
    pub unit_amount: Option<Decimal>,
    /// Unix timestamp in milliseconds, spot only
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub timestamp: Option<i64>,
}

/// A single order book level.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: Decimal,
    pub amount: Decimal,
}

/// Order book snapshot.
///
/// Rows are `[price, amount, ...]`; futures rows carry extra coin-denominated and cumulative
/// columns after the first two.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Depth {
    #[serde(default)]
    pub asks: Vec<Vec<Decimal>>,
    #[serde(default)]
    pub bids: Vec<Vec<Decimal>>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub timestamp: Option<i64>,
}

impl Depth {
    /// Lowest ask.
    #[must_use]
    pub fn best_ask(&self) -> Option<PriceLevel> {
        Self::levels(&self.asks).min_by_key(|level| level.price)
    }

    /// Highest bid.
    #[must_use]
    pub fn best_bid(&self) -> Option<PriceLevel> {
        Self::levels(&self.bids).max_by_key(|level| level.price)
    }

    fn levels(rows: &[Vec<Decimal>]) -> impl Iterator<Item = PriceLevel> + '_ {
        rows.iter().filter_map(|row| match row.as_slice() {
            [price, amount, ..] => Some(PriceLevel {
                price: *price,
                amount: *amount,
            }),
            _ => None,
        })
    }
}

/// Futures index update.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FutureIndex {
    #[serde(rename = "futureIndex")]
    pub index: Decimal,
    /// Unix timestamp in milliseconds
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub timestamp: i64,
}

/// Login reply.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoginResult {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub result: bool,
}
