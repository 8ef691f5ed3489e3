//! Relay endpoints
//!
//! An endpoint is a `ws` or `wss` URL: scheme, host, optional port and an
//! optional path. The selector rotates deterministically through the
//! configured candidates so that repeated failures try every candidate
//! before repeating one, unless a manual override pins a single endpoint.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors parsing an endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Unsupported scheme '{0}'. Use ws:// or wss://")]
    UnsupportedScheme(String),

    #[error("Endpoint '{0}' has no host")]
    MissingHost(String),

    #[error("Invalid port in endpoint '{0}'")]
    InvalidPort(String),

    #[error("Invalid endpoint '{0}': {1}")]
    Invalid(String, String),
}

/// Transport scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Ws,
    Wss,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }
}

/// A relay address to connect to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    /// `None` when the URL names the scheme's default port
    pub port: Option<u16>,
    /// Path and query after the authority, empty for `/`
    pub path: String,
}

impl Endpoint {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
            path: String::new(),
        }
    }

    /// Same endpoint with a path such as `/ws`
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// URL to hand to the WebSocket client
    pub fn url(&self) -> String {
        self.to_string()
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(Scheme::Ws, "localhost", Some(8080))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        f.write_str(&self.path)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    /// Parse `ws://host[:port][/path]`, `wss://...` or a bare
    /// `host[:port]` (which defaults to `ws`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let with_scheme = if input.contains("://") {
            input.to_string()
        } else {
            format!("ws://{}", input)
        };

        let url = Url::parse(&with_scheme).map_err(|err| match err {
            url::ParseError::EmptyHost => EndpointError::MissingHost(input.to_string()),
            url::ParseError::InvalidPort => EndpointError::InvalidPort(input.to_string()),
            other => EndpointError::Invalid(input.to_string(), other.to_string()),
        })?;

        let scheme = match url.scheme() {
            "ws" => Scheme::Ws,
            "wss" => Scheme::Wss,
            other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
        };

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(EndpointError::MissingHost(input.to_string())),
        };

        let mut path = match url.path() {
            "/" => String::new(),
            path => path.to_string(),
        };
        if let Some(query) = url.query() {
            if path.is_empty() {
                path.push('/');
            }
            path.push('?');
            path.push_str(query);
        }

        Ok(Self {
            scheme,
            host,
            port: url.port(),
            path,
        })
    }
}

impl TryFrom<String> for Endpoint {
    type Error = EndpointError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

/// Chooses which endpoint the next connection attempt uses
#[derive(Debug, Clone)]
pub struct EndpointSelector {
    candidates: Vec<Endpoint>,
}

impl EndpointSelector {
    /// Create a selector over an ordered candidate list
    ///
    /// An empty list falls back to the default endpoint so `next` always
    /// has something to return.
    pub fn new(candidates: Vec<Endpoint>) -> Self {
        let candidates = if candidates.is_empty() {
            vec![Endpoint::default()]
        } else {
            candidates
        };
        Self { candidates }
    }

    /// Endpoint for the given attempt
    ///
    /// With an override, always the override. Otherwise the candidate at
    /// `attempt mod len`.
    pub fn next<'a>(&'a self, attempt: u64, override_endpoint: Option<&'a Endpoint>) -> &'a Endpoint {
        if let Some(endpoint) = override_endpoint {
            return endpoint;
        }
        let index = (attempt % self.candidates.len() as u64) as usize;
        &self.candidates[index]
    }

    pub fn candidates(&self) -> &[Endpoint] {
        &self.candidates
    }
}
