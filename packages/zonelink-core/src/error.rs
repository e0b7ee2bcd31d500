//! Centralized error types for the zonelink core library.
//!
//! Each concern keeps its own `thiserror` enum and `Result` alias;
//! [`SystemError`] wraps them for the operations of [`crate::SonosSystem`].
//! Every error exposes a stable machine-readable code through [`ErrorCode`].

use thiserror::Error;

use crate::config::ConfigError;
use crate::events::ListenerError;
use crate::sonos::discovery::{DiscoveryError, EndpointError};
use crate::sonos::gena_client::GenaError;
use crate::sonos::soap::SoapError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a stable snake_case error code.
    fn code(&self) -> &'static str;
}

impl ErrorCode for DiscoveryError {
    fn code(&self) -> &'static str {
        match self {
            Self::SocketBind(_) => "socket_bind_failed",
            Self::SendSearch(_) => "ssdp_send_failed",
            Self::NoResponse(_) => "no_response",
            Self::MalformedLocation(_) => "malformed_location",
        }
    }
}

impl ErrorCode for EndpointError {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingScheme(_) => "endpoint_missing_scheme",
            Self::MissingHost(_) => "endpoint_missing_host",
            Self::MissingPort(_) => "endpoint_missing_port",
            Self::InvalidPort(_) => "endpoint_invalid_port",
        }
    }
}

impl ErrorCode for SoapError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::HttpStatus(_, _) => "http_error_status",
            Self::Fault(_) => "soap_fault",
            Self::MissingElement(_) => "soap_missing_element",
        }
    }
}

impl ErrorCode for GenaError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::SubscriptionFailed(_) => "gena_subscription_failed",
            Self::RenewalFailed(_) => "gena_renewal_failed",
            Self::MissingSid => "gena_missing_sid",
            Self::NotActive => "gena_not_active",
        }
    }
}

impl ErrorCode for ListenerError {
    fn code(&self) -> &'static str {
        match self {
            Self::Bind { .. } => "listener_bind_failed",
        }
    }
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "config_read_failed",
            Self::Parse { .. } => "config_parse_failed",
            Self::Invalid(_) => "config_invalid",
        }
    }
}

/// Errors from [`crate::SonosSystem`] operations.
#[derive(Debug, Error)]
pub enum SystemError {
    /// No zone player answered the search.
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// The discovered location could not be parsed as an endpoint.
    #[error("Malformed endpoint: {0}")]
    MalformedEndpoint(#[from] EndpointError),

    /// Neither a notification nor the manual fetch produced a topology.
    #[error("Topology snapshot unavailable: {0}")]
    SnapshotUnavailable(#[from] SoapError),

    /// The event listener could not be started.
    #[error("Event listener unavailable: {0}")]
    ListenerUnavailable(#[from] ListenerError),

    /// No topology has been established yet.
    #[error("No household discovered")]
    NotDiscovered,

    /// The player's zone is not part of the current topology.
    #[error("Unknown zone group: {0}")]
    UnknownGroup(String),

    /// The zone has no coordinator to control it through.
    #[error("Zone {0} has no coordinator")]
    EmptyZone(String),

    /// The control session for the zone did not come up.
    #[error("Could not open a control session for zone {0}")]
    InvalidSession(String),

    /// The shared HTTP client could not be built.
    #[error("Failed to create HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

impl ErrorCode for SystemError {
    fn code(&self) -> &'static str {
        match self {
            Self::Discovery(e) => e.code(),
            Self::MalformedEndpoint(e) => e.code(),
            Self::SnapshotUnavailable(_) => "snapshot_unavailable",
            Self::ListenerUnavailable(e) => e.code(),
            Self::NotDiscovered => "not_discovered",
            Self::UnknownGroup(_) => "unknown_group",
            Self::EmptyZone(_) => "empty_zone",
            Self::InvalidSession(_) => "invalid_session",
            Self::HttpClient(_) => "http_client_failed",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result Type Aliases
// ─────────────────────────────────────────────────────────────────────────────

pub use crate::sonos::discovery::DiscoveryResult;
pub use crate::sonos::gena_client::GenaResult;
pub use crate::sonos::soap::SoapResult;

/// Convenient Result alias for system operations.
pub type SystemResult<T> = Result<T, SystemError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn wrapped_errors_keep_their_codes() {
        let err = SystemError::from(DiscoveryError::NoResponse(Duration::from_secs(5)));
        assert_eq!(err.code(), "no_response");

        let err = SystemError::from(EndpointError::MissingPort("http://host/".into()));
        assert_eq!(err.code(), "endpoint_missing_port");
    }

    #[test]
    fn snapshot_failure_has_its_own_code() {
        let err = SystemError::from(SoapError::MissingElement("ZoneGroupState"));
        assert_eq!(err.code(), "snapshot_unavailable");
        assert!(err.to_string().contains("ZoneGroupState"));
    }

    #[test]
    fn zone_errors_name_the_zone() {
        assert_eq!(
            SystemError::UnknownGroup("RINCON_X:1".into()).to_string(),
            "Unknown zone group: RINCON_X:1"
        );
        assert_eq!(SystemError::EmptyZone("RINCON_X:1".into()).code(), "empty_zone");
    }
}
