use std::fmt;
use std::str::FromStr;

use url::{Host, ParseError, Url};

use super::error::WsError;
use crate::Result;

const WS_DEFAULT_PORT: u16 = 80;
const WSS_DEFAULT_PORT: u16 = 443;

/// A validated `ws://` or `wss://` endpoint.
///
/// The scheme decides whether TLS is negotiated and which port is used when the URI omits
/// one (80 for `ws`, 443 for `wss`). A URI without a scheme is treated as `ws`.
///
/// ```
/// use xstream::ws::Endpoint;
///
/// let endpoint = Endpoint::parse("wss://stream.example.com/ws")?;
/// assert_eq!(endpoint.port(), 443);
/// assert!(endpoint.is_tls());
/// # Ok::<(), xstream::error::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    host: String,
    port: u16,
    tls: bool,
}

impl Endpoint {
    /// Parse and validate an endpoint URI.
    ///
    /// Fails with [`WsError::InvalidEndpoint`] for malformed URIs, schemes other than
    /// `ws`/`wss`, or a missing host.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("ws://{raw}"))
                .map_err(|e| WsError::InvalidEndpoint(format!("{raw}: {e}")))?,
            Err(e) => return Err(WsError::InvalidEndpoint(format!("{raw}: {e}")).into()),
        };

        let (tls, default_port) = match url.scheme() {
            "ws" => (false, WS_DEFAULT_PORT),
            "wss" => (true, WSS_DEFAULT_PORT),
            other => {
                return Err(WsError::InvalidEndpoint(format!(
                    "unsupported scheme `{other}`, only ws and wss are supported"
                ))
                .into());
            }
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_owned(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => {
                return Err(WsError::InvalidEndpoint(format!("{raw}: host cannot be empty")).into());
            }
        };

        let port = url.port().unwrap_or(default_port);

        Ok(Self {
            url,
            host,
            port,
            tls,
        })
    }

    /// The full endpoint URL, used for the upgrade request.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Host to open the TCP connection to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port to open the TCP connection to, with the scheme default applied.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Whether the connection negotiates TLS before the WebSocket handshake.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.tls
    }
}

impl FromStr for Endpoint {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}
