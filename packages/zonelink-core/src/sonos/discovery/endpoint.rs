//! Device description endpoint parsed from an SSDP `LOCATION` value.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::{Host, ParseError, Url};

/// Reasons a location string cannot be used as an endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("location has no scheme: {0}")]
    MissingScheme(String),

    #[error("location has no host: {0}")]
    MissingHost(String),

    #[error("location has no port: {0}")]
    MissingPort(String),

    #[error("location has an invalid port: {0}")]
    InvalidPort(String),
}

/// Resolved `{scheme, host, port, path}` of a device description resource.
///
/// Scheme, host and an explicit non-zero port are always present; a location
/// missing any of them is rejected by [`FromStr`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    scheme: String,
    host: String,
    port: u16,
    path: String,
}

impl Endpoint {
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host name or address, without IPv6 brackets.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `host:port` suitable for an authority component.
    #[must_use]
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// URL of another resource on the same device.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        format!("{}://{}{}", self.scheme, self.authority(), path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url_for(&self.path))
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let url = Url::parse(raw).map_err(|e| match e {
            ParseError::RelativeUrlWithoutBase => EndpointError::MissingScheme(raw.to_string()),
            ParseError::InvalidPort => EndpointError::InvalidPort(raw.to_string()),
            _ => EndpointError::MissingHost(raw.to_string()),
        })?;

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            _ => return Err(EndpointError::MissingHost(raw.to_string())),
        };
        let port = explicit_port(&url, raw)
            .ok_or_else(|| EndpointError::MissingPort(raw.to_string()))?;
        if port == 0 {
            return Err(EndpointError::InvalidPort(raw.to_string()));
        }

        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            port,
            path,
        })
    }
}

/// Port written in the location.
///
/// `Url` drops a port equal to the scheme default, so `:80` on `http` is
/// recovered from the raw authority.
fn explicit_port(url: &Url, raw: &str) -> Option<u16> {
    url.port().or_else(|| {
        let default = url.port_or_known_default()?;
        let (_, rest) = raw.split_once("://")?;
        let authority = rest.split(['/', '?', '#']).next()?;
        authority.ends_with(&format!(":{}", default)).then_some(default)
    })
}
