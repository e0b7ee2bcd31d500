//! Event plumbing.
//!
//! This module provides:
//! - [`EventListener`], the GENA callback server shared by subscribers
//! - [`EventEmitter`] trait for reporting state changes to observers
//! - [`BroadcastEventBridge`] for fan-out over a tokio broadcast channel
//! - Event types for topology, zone connection and listener lifecycle

mod bridge;
mod emitter;
pub mod listener;
pub mod message;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};
pub use listener::{EventListener, EventSubscriber, ListenerError, SubscriberId};
pub use message::{EventKind, EventMessage};

use serde::Serialize;

use crate::sonos::types::{TransportState, Zone};
use crate::system::SnapshotSource;

/// Events reported to observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum SystemEvent {
    /// Household topology changes.
    Topology(TopologyEvent),

    /// Connected zone changes and zone playback state.
    Zone(ZoneEvent),

    /// Event listener lifecycle.
    Listener(ListenerEvent),
}

/// Serializable view of a [`Zone`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSummary {
    pub id: String,
    pub name: String,
    /// UUID of the coordinator, absent for zones without one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<String>,
    pub members: Vec<String>,
}

impl From<&Zone> for ZoneSummary {
    fn from(zone: &Zone) -> Self {
        Self {
            id: zone.id().to_string(),
            name: zone.name(),
            coordinator: zone.coordinator().map(|c| c.uuid().to_string()),
            members: zone.members().iter().map(|m| m.uuid().to_string()).collect(),
        }
    }
}

/// Events from topology discovery and updates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TopologyEvent {
    /// A new topology snapshot was applied.
    Updated {
        /// Zones with a coordinator.
        zones: Vec<ZoneSummary>,
        source: SnapshotSource,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events about the connected zone.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ZoneEvent {
    /// A control session for the zone was established.
    Connected {
        zone: ZoneSummary,
        timestamp: u64,
    },
    /// The connected zone was released.
    Disconnected {
        #[serde(rename = "zoneId")]
        zone_id: String,
        timestamp: u64,
    },
    /// The zone coordinator reported a new transport state.
    TransportState {
        #[serde(rename = "zoneId")]
        zone_id: String,
        state: TransportState,
        timestamp: u64,
    },
}

/// Events about the callback listener.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ListenerEvent {
    Started { port: u16, timestamp: u64 },
    Stopped { timestamp: u64 },
}

impl From<TopologyEvent> for SystemEvent {
    fn from(event: TopologyEvent) -> Self {
        SystemEvent::Topology(event)
    }
}

impl From<ZoneEvent> for SystemEvent {
    fn from(event: ZoneEvent) -> Self {
        SystemEvent::Zone(event)
    }
}

impl From<ListenerEvent> for SystemEvent {
    fn from(event: ListenerEvent) -> Self {
        SystemEvent::Listener(event)
    }
}
