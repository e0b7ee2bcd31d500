//! Concrete device client.
//!
//! [`SonosClientImpl`] implements every trait in [`super::traits`] on top of
//! one shared `reqwest` client, the SSDP engine and the GENA client.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::SystemConfig;
use crate::sonos::discovery::{DiscoveryResult, Endpoint, SsdpDiscovery};
use crate::sonos::gena_client::{GenaClient, GenaResult, SubscribeResponse};
use crate::sonos::services::SonosService;
use crate::sonos::soap::{SoapError, SoapRequestBuilder, SoapResult};
use crate::sonos::traits::{SonosDiscovery, SonosEventing, SonosTopology, SonosTransport};
use crate::sonos::types::TransportState;
use crate::sonos::utils::extract_xml_text;

/// Network-backed implementation of [`crate::sonos::SonosClient`].
#[derive(Clone)]
pub struct SonosClientImpl {
    /// HTTP client shared by SOAP and GENA requests.
    client: Client,
    gena: GenaClient,
    discovery: SsdpDiscovery,
    soap_timeout: Duration,
}

impl fmt::Debug for SonosClientImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SonosClientImpl")
            .field("client", &"Client")
            .field("discovery", &self.discovery)
            .field("soap_timeout", &self.soap_timeout)
            .finish()
    }
}

impl SonosClientImpl {
    /// Creates a client using `config` for discovery and SOAP timeouts.
    #[must_use]
    pub fn new(client: Client, config: &SystemConfig) -> Self {
        Self {
            gena: GenaClient::new(client.clone(), config.soap_timeout()),
            client,
            discovery: SsdpDiscovery::new(config.discovery.clone()),
            soap_timeout: config.soap_timeout(),
        }
    }
}

#[async_trait]
impl SonosDiscovery for SonosClientImpl {
    async fn find_device_description(&self) -> DiscoveryResult<String> {
        self.discovery.find_device_description().await
    }
}

#[async_trait]
impl SonosEventing for SonosClientImpl {
    async fn subscribe(
        &self,
        event_url: &str,
        callback_url: &str,
        lease_secs: u64,
    ) -> GenaResult<SubscribeResponse> {
        self.gena.subscribe(event_url, callback_url, lease_secs).await
    }

    async fn renew(&self, event_url: &str, sid: &str, lease_secs: u64) -> GenaResult<u64> {
        self.gena.renew(event_url, sid, lease_secs).await
    }

    async fn unsubscribe(&self, event_url: &str, sid: &str) -> bool {
        self.gena.unsubscribe(event_url, sid).await
    }
}

#[async_trait]
impl SonosTopology for SonosClientImpl {
    async fn get_zone_group_state(&self, device: &Endpoint) -> SoapResult<String> {
        let response = SoapRequestBuilder::new(&self.client, device)
            .service(SonosService::ZoneGroupTopology)
            .action("GetZoneGroupState")
            .timeout(self.soap_timeout)
            .send()
            .await?;

        extract_xml_text(&response, "ZoneGroupState")
            .ok_or(SoapError::MissingElement("ZoneGroupState"))
    }
}

#[async_trait]
impl SonosTransport for SonosClientImpl {
    async fn get_transport_state(&self, device: &Endpoint) -> SoapResult<TransportState> {
        let response = SoapRequestBuilder::new(&self.client, device)
            .service(SonosService::AVTransport)
            .action("GetTransportInfo")
            .instance_id()
            .timeout(self.soap_timeout)
            .send()
            .await?;

        extract_xml_text(&response, "CurrentTransportState")
            .and_then(|s| s.parse().ok())
            .ok_or(SoapError::MissingElement("CurrentTransportState"))
    }
}
