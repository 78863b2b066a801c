pub mod request;
pub mod response;

/// Futures underlying ("tool") traded against USD.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Tool {
    Btc,
    Ltc,
    Eth,
    Etc,
    Bch,
}

/// Futures contract delivery period.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FuturesContract {
    ThisWeek,
    NextWeek,
    Quarter,
}

/// Number of price levels per side in a depth channel.
///
/// Futures depth channels accept 20 and 60; spot depth channels accept 5, 10 and 20.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum DepthLevel {
    #[strum(serialize = "5")]
    Five,
    #[strum(serialize = "10")]
    Ten,
    #[strum(serialize = "20")]
    Twenty,
    #[strum(serialize = "60")]
    Sixty,
}

/// Heartbeat text the server answers with `{"event":"pong"}`.
pub const PING_PAYLOAD: &str = r#"{"event":"ping"}"#;

/// Channel the login reply arrives on.
pub const LOGIN_CHANNEL: &str = "login";

/// Channel name the private futures data batch is subscribed under.
pub const USER_INFO_CHANNEL: &str = "ok_sub_futureusd_userinfo";
pub const POSITIONS_CHANNEL: &str = "ok_sub_futureusd_positions";
pub const TRADES_CHANNEL: &str = "ok_sub_futureusd_trades";

/// Channels one private data subscription delivers on.
pub const PRIVATE_CHANNELS: [&str; 3] = [USER_INFO_CHANNEL, POSITIONS_CHANNEL, TRADES_CHANNEL];

/// `ok_sub_futureusd_{tool}_depth_{contract}_{depth}`
#[must_use]
pub fn futures_depth_channel(tool: Tool, contract: FuturesContract, depth: DepthLevel) -> String {
    format!("ok_sub_futureusd_{tool}_depth_{contract}_{depth}")
}

/// `ok_sub_futureusd_{tool}_ticker_{contract}`
#[must_use]
pub fn futures_ticker_channel(tool: Tool, contract: FuturesContract) -> String {
    format!("ok_sub_futureusd_{tool}_ticker_{contract}")
}

/// `ok_sub_futureusd_{tool}_index`
#[must_use]
pub fn futures_index_channel(tool: Tool) -> String {
    format!("ok_sub_futureusd_{tool}_index")
}

/// `ok_sub_spot_{base}_{quote}_ticker`, currencies lower-cased.
#[must_use]
pub fn spot_ticker_channel(base: &str, quote: &str) -> String {
    format!(
        "ok_sub_spot_{}_{}_ticker",
        base.to_lowercase(),
        quote.to_lowercase()
    )
}

/// `ok_sub_spot_{base}_{quote}_depth_{depth}`, currencies lower-cased.
#[must_use]
pub fn spot_depth_channel(base: &str, quote: &str, depth: DepthLevel) -> String {
    format!(
        "ok_sub_spot_{}_{}_depth_{depth}",
        base.to_lowercase(),
        quote.to_lowercase()
    )
}
