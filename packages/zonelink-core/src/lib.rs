//! Zonelink Core - control-plane library for Sonos households.
//!
//! The crate finds a zone player with SSDP, learns the household topology
//! from ZoneGroupTopology events (falling back to a manual
//! `GetZoneGroupState` pull), and tracks which zone the caller controls.
//!
//! # Architecture
//!
//! - [`sonos`]: discovery, GENA subscriptions, SOAP, topology and sessions
//! - [`events`]: the shared GENA callback listener and observer events
//! - [`system`]: [`SonosSystem`], tying the above together
//! - [`context`]: callback address selection
//! - [`config`]: YAML and environment configuration
//! - [`error`]: error types and codes
//!
//! # Abstraction Traits
//!
//! - [`SonosClient`](sonos::SonosClient): network operations on devices
//! - [`SessionFactory`](sonos::player::SessionFactory): zone control sessions
//! - [`EventEmitter`](events::EventEmitter): observer notifications
//! - [`LineReader`](sonos::discovery::LineReader): SSDP reply transport
//! - [`IpDetector`](context::IpDetector): local IP detection

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod protocol_constants;
pub mod sonos;
pub mod system;
pub mod utils;

pub use config::{ConfigError, DiscoveryConfig, ListenerConfig, SystemConfig};
pub use context::{IpDetector, LocalIpDetector, NetworkContext, NetworkError, UrlBuilder};
pub use error::{DiscoveryResult, ErrorCode, GenaResult, SoapResult, SystemError, SystemResult};
pub use events::{
    BroadcastEventBridge, EventEmitter, EventKind, EventListener, EventMessage, ListenerEvent,
    LoggingEventEmitter, NoopEventEmitter, SystemEvent, TopologyEvent, ZoneEvent, ZoneSummary,
};
pub use system::{ConnectedZone, SnapshotSource, SonosSystem};

pub use sonos::discovery::{Endpoint, SsdpDiscovery};
pub use sonos::player::{ControlSession, SessionFactory, SonosPlayer, SonosSessionFactory};
pub use sonos::types::{TransportState, Zone, ZoneList, ZonePlayer, ZonePlayerList};
pub use sonos::{SonosClient, SonosClientImpl, SonosService};
