//! Runtime configuration.
//!
//! Every field has a default matching [`crate::protocol_constants`], so an
//! empty YAML document (or no file at all) yields a working configuration.
//! Environment variables override file values.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol_constants::{
    DEFAULT_LISTENER_PORT, DISCOVER_TIMEOUT_MS, FIRST_SNAPSHOT_TIMEOUT_MS,
    GENA_RENEWAL_BUFFER_SECS, GENA_SUBSCRIPTION_TIMEOUT_SECS, SOAP_TIMEOUT_SECS,
    SSDP_MULTICAST_IP, SSDP_MULTICAST_TTL, SSDP_MX_SECS, SSDP_PORT, SSDP_READ_TIMEOUT_MS,
    ZONE_PLAYER_SEARCH_TARGET,
};

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// SSDP search settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// `ST` value sent and expected back.
    pub search_target: String,
    /// Multicast group the search is sent to.
    pub multicast_addr: SocketAddr,
    /// Overall discovery window in milliseconds.
    /// Override: `ZONELINK_DISCOVER_TIMEOUT_MS`
    pub discover_timeout_ms: u64,
    /// Per-read socket timeout in milliseconds.
    pub read_timeout_ms: u64,
    pub multicast_ttl: u32,
    pub mx_secs: u64,
}

impl DiscoveryConfig {
    #[must_use]
    pub fn discover_timeout(&self) -> Duration {
        Duration::from_millis(self.discover_timeout_ms)
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            search_target: ZONE_PLAYER_SEARCH_TARGET.to_string(),
            multicast_addr: SocketAddr::new(IpAddr::V4(SSDP_MULTICAST_IP), SSDP_PORT),
            discover_timeout_ms: DISCOVER_TIMEOUT_MS,
            read_timeout_ms: SSDP_READ_TIMEOUT_MS,
            multicast_ttl: SSDP_MULTICAST_TTL,
            mx_secs: SSDP_MX_SECS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Listener
// ─────────────────────────────────────────────────────────────────────────────

/// Event listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address the callback server binds to.
    pub bind_ip: IpAddr,
    /// Port to bind (0 picks an ephemeral port).
    /// Override: `ZONELINK_LISTENER_PORT`
    pub port: u16,
    /// IP address advertised to devices in GENA `CALLBACK` headers.
    /// Auto-detected when unset.
    /// Override: `ZONELINK_ADVERTISE_IP`
    pub advertise_ip: Option<IpAddr>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_LISTENER_PORT,
            advertise_ip: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// System
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for a [`crate::SonosSystem`] and its collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SystemConfig {
    pub discovery: DiscoveryConfig,
    pub listener: ListenerConfig,
    /// How long to wait for the first topology notification before pulling.
    /// Override: `ZONELINK_CALLBACK_TIMEOUT_MS`
    pub callback_timeout_ms: u64,
    /// Lease requested for GENA subscriptions.
    pub subscription_lease_secs: u64,
    /// Renew this long before the lease runs out.
    pub renewal_buffer_secs: u64,
    pub soap_timeout_secs: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            listener: ListenerConfig::default(),
            callback_timeout_ms: FIRST_SNAPSHOT_TIMEOUT_MS,
            subscription_lease_secs: GENA_SUBSCRIPTION_TIMEOUT_SECS,
            renewal_buffer_secs: GENA_RENEWAL_BUFFER_SECS,
            soap_timeout_secs: SOAP_TIMEOUT_SECS,
        }
    }
}

impl SystemConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary key lookup.
    ///
    /// Unparseable values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("ZONELINK_LISTENER_PORT").and_then(|v| v.parse().ok()) {
            self.listener.port = port;
        }

        if let Some(ip) = lookup("ZONELINK_ADVERTISE_IP").and_then(|v| v.parse().ok()) {
            self.listener.advertise_ip = Some(ip);
        }

        if let Some(ms) = lookup("ZONELINK_DISCOVER_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.discovery.discover_timeout_ms = ms;
        }

        if let Some(ms) = lookup("ZONELINK_CALLBACK_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.callback_timeout_ms = ms;
        }
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.discovery;
        if d.search_target.trim().is_empty() {
            return Err(ConfigError::Invalid("search_target must not be empty".into()));
        }
        if d.discover_timeout_ms == 0 {
            return Err(ConfigError::Invalid("discover_timeout_ms must be >= 1".into()));
        }
        if d.read_timeout_ms == 0 || d.read_timeout_ms > d.discover_timeout_ms {
            return Err(ConfigError::Invalid(
                "read_timeout_ms must be between 1 and discover_timeout_ms".into(),
            ));
        }
        if self.subscription_lease_secs <= self.renewal_buffer_secs {
            return Err(ConfigError::Invalid(
                "subscription_lease_secs must exceed renewal_buffer_secs".into(),
            ));
        }
        if self.soap_timeout_secs == 0 {
            return Err(ConfigError::Invalid("soap_timeout_secs must be >= 1".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_millis(self.callback_timeout_ms)
    }

    #[must_use]
    pub fn soap_timeout(&self) -> Duration {
        Duration::from_secs(self.soap_timeout_secs)
    }
}
