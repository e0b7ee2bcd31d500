//! Trait abstractions for device operations.
//!
//! These traits enable dependency injection for testability and modularity.
//! The system and its collaborators depend on traits rather than concrete
//! implementations.

use async_trait::async_trait;

use crate::sonos::discovery::{DiscoveryResult, Endpoint};
use crate::sonos::gena_client::{GenaResult, SubscribeResponse};
use crate::sonos::soap::SoapResult;
use crate::sonos::types::TransportState;

/// Trait for locating a zone player on the network.
#[async_trait]
pub trait SonosDiscovery: Send + Sync {
    /// Returns the device description URL of the first matching responder.
    async fn find_device_description(&self) -> DiscoveryResult<String>;

    /// Searches the network and parses the advertised location.
    async fn discover_endpoint(&self) -> DiscoveryResult<Endpoint> {
        let location = self.find_device_description().await?;
        Ok(location.parse()?)
    }
}

/// Trait for GENA subscription requests.
///
/// Used by `Subscription` to register, renew and cancel event delivery.
#[async_trait]
pub trait SonosEventing: Send + Sync {
    /// Registers `callback_url` for events from `event_url`.
    async fn subscribe(
        &self,
        event_url: &str,
        callback_url: &str,
        lease_secs: u64,
    ) -> GenaResult<SubscribeResponse>;

    /// Extends the lease of `sid`; returns the lease granted.
    async fn renew(&self, event_url: &str, sid: &str, lease_secs: u64) -> GenaResult<u64>;

    /// Cancels `sid`. Returns `false` if the device did not confirm.
    async fn unsubscribe(&self, event_url: &str, sid: &str) -> bool;
}

/// Trait for pulling the household topology.
///
/// Used by `ZoneGroupTopology` for the manual fetch.
#[async_trait]
pub trait SonosTopology: Send + Sync {
    /// Calls `GetZoneGroupState` on `device` and returns the unescaped
    /// ZoneGroupState document.
    async fn get_zone_group_state(&self, device: &Endpoint) -> SoapResult<String>;
}

/// Trait for transport queries on a zone coordinator.
///
/// Used by `SonosPlayer` to check that a coordinator answers.
#[async_trait]
pub trait SonosTransport: Send + Sync {
    async fn get_transport_state(&self, device: &Endpoint) -> SoapResult<TransportState>;
}

/// Combined trait for all device operations.
#[async_trait]
pub trait SonosClient: SonosDiscovery + SonosEventing + SonosTopology + SonosTransport {}

// Blanket implementation: any type implementing all traits is a SonosClient
impl<T: SonosDiscovery + SonosEventing + SonosTopology + SonosTransport> SonosClient for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sonos::discovery::{DiscoveryError, EndpointError};

    struct FixedLocation(&'static str);

    #[async_trait]
    impl SonosDiscovery for FixedLocation {
        async fn find_device_description(&self) -> DiscoveryResult<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn discover_endpoint_parses_location() {
        let discovery = FixedLocation("http://10.0.0.5:1400/xml/device_description.xml");
        let endpoint = discovery.discover_endpoint().await.unwrap();
        assert_eq!(endpoint.host(), "10.0.0.5");
        assert_eq!(endpoint.port(), 1400);
    }

    #[tokio::test]
    async fn discover_endpoint_rejects_unusable_location() {
        let discovery = FixedLocation("http://10.0.0.5/xml/device_description.xml");
        assert!(matches!(
            discovery.discover_endpoint().await,
            Err(DiscoveryError::MalformedLocation(EndpointError::MissingPort(_)))
        ));
    }
}
