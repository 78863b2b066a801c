use std::fmt;

use secrecy::{ExposeSecret as _, SecretString};
use serde::Serialize;

use crate::Result;

/// API key and request signature for private channels.
///
/// The signature is the upper-case MD5 digest of `api_key=<key>&secret_key=<secret>`, computed
/// by the caller so the secret key itself never reaches this crate.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    sign: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(api_key: String, sign: String) -> Self {
        Self {
            api_key,
            sign: SecretString::from(sign),
        }
    }

    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Subscribe parameters in the order the adapter expects: api key, then signature.
    ///
    /// # Security
    ///
    /// The returned vector holds the signature in plaintext.
    #[must_use]
    pub fn params(&self) -> Vec<String> {
        vec![self.api_key.clone(), self.sign.expose_secret().to_owned()]
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("sign", &"[REDACTED]")
            .finish()
    }
}

/// Event type of an outbound request.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Event {
    AddChannel,
    RemoveChannel,
    Login,
}

/// Authentication parameters attached to private requests.
#[non_exhaustive]
#[derive(Clone, Debug, Serialize)]
pub struct Parameters {
    pub api_key: String,
    pub sign: String,
}

/// Outbound request.
///
/// # Security
///
/// When serialized, `parameters` carries the request signature in plaintext.
#[non_exhaustive]
#[derive(Clone, Debug, Serialize)]
pub struct Request {
    pub event: Event,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
}

impl Request {
    /// `{"event":"addChannel","channel":...}`
    #[must_use]
    pub fn add_channel(channel: &str) -> Self {
        Self {
            event: Event::AddChannel,
            channel: Some(channel.to_owned()),
            parameters: None,
        }
    }

    /// `{"event":"removeChannel","channel":...}`
    #[must_use]
    pub fn remove_channel(channel: &str) -> Self {
        Self {
            event: Event::RemoveChannel,
            channel: Some(channel.to_owned()),
            parameters: None,
        }
    }

    /// `{"event":"login","parameters":{"api_key":...,"sign":...}}`
    #[must_use]
    pub fn login(credentials: &Credentials) -> Self {
        Self {
            event: Event::Login,
            channel: None,
            parameters: Some(Parameters {
                api_key: credentials.api_key.clone(),
                sign: credentials.sign.expose_secret().to_owned(),
            }),
        }
    }

    /// Attach authentication parameters.
    #[must_use]
    pub fn with_parameters(mut self, api_key: String, sign: String) -> Self {
        self.parameters = Some(Parameters { api_key, sign });
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
