//! Zone player discovery, eventing and control.
//!
//! # Module Structure
//!
//! - `discovery` - SSDP search, header scanning and response matching
//! - `types` - Zones, players and transport state
//! - `services` - UPnP service definitions (URNs, paths)
//! - `traits` - Trait abstractions for testability
//! - `client` - `SonosClientImpl` concrete trait implementation
//! - `gena_client` - GENA HTTP operations
//! - `subscription` - One GENA subscription and its renewal
//! - `zone_groups` - ZoneGroupState parsing
//! - `topology` - Topology cache fed by events and manual fetches
//! - `player` - Control sessions bound to a zone
//! - `soap` - Low-level SOAP protocol implementation
//! - `utils` - XML helpers

pub mod client;
pub mod discovery;
pub mod gena_client;
pub mod player;
pub(crate) mod retry;
pub mod services;
pub mod soap;
pub mod subscription;
pub mod topology;
pub mod traits;
pub mod types;
pub mod utils;
pub mod zone_groups;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use services::SonosService;

pub use traits::{SonosClient, SonosDiscovery, SonosEventing, SonosTopology, SonosTransport};

pub use client::SonosClientImpl;
