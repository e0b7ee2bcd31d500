//! Shared types for zone player discovery.

use std::time::Duration;

use thiserror::Error;

use super::endpoint::EndpointError;

/// Errors that can occur during discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Failed to bind UDP socket for discovery.
    #[error("failed to bind UDP socket: {0}")]
    SocketBind(#[source] std::io::Error),

    /// Failed to send SSDP multicast search.
    #[error("failed to send SSDP search: {0}")]
    SendSearch(#[source] std::io::Error),

    /// No fully matching reply arrived within the discovery window.
    #[error("no zone player responded within {}ms", .0.as_millis())]
    NoResponse(Duration),

    /// A reply matched but its location is not a usable endpoint.
    #[error("zone player advertised an unusable location: {0}")]
    MalformedLocation(#[from] EndpointError),
}

/// Convenient Result alias for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
