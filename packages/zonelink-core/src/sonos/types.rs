//! Domain types for zones, players and transport state.
//!
//! A [`Zone`] is a ZoneGroup from the household topology: one or more
//! [`ZonePlayer`]s playing in sync, led by an elected coordinator. Both are
//! shared behind `Arc` so snapshots handed to callers stay cheap and
//! immutable.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use super::discovery::Endpoint;

// ─────────────────────────────────────────────────────────────────────────────
// Transport State
// ─────────────────────────────────────────────────────────────────────────────

/// Playback transport state as reported by the AVTransport service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransportState {
    Playing,
    #[serde(rename = "PAUSED_PLAYBACK")]
    Paused,
    Stopped,
    Transitioning,
    #[serde(rename = "NO_MEDIA_PRESENT")]
    NoMedia,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playing => write!(f, "Playing"),
            Self::Paused => write!(f, "Paused"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Transitioning => write!(f, "Transitioning"),
            Self::NoMedia => write!(f, "No media"),
        }
    }
}

/// Error returned when parsing an unknown transport state string.
#[derive(Debug, Clone, Error)]
#[error("unknown transport state")]
pub struct ParseTransportStateError;

impl FromStr for TransportState {
    type Err = ParseTransportStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLAYING" => Ok(Self::Playing),
            "PAUSED_PLAYBACK" | "PAUSED" => Ok(Self::Paused),
            "STOPPED" => Ok(Self::Stopped),
            "TRANSITIONING" => Ok(Self::Transitioning),
            "NO_MEDIA_PRESENT" => Ok(Self::NoMedia),
            _ => Err(ParseTransportStateError),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Players
// ─────────────────────────────────────────────────────────────────────────────

/// An individual addressable zone player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZonePlayer {
    uuid: String,
    name: String,
    location: String,
    group: String,
    is_coordinator: bool,
}

impl ZonePlayer {
    pub fn new(
        uuid: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<String>,
        group: impl Into<String>,
        is_coordinator: bool,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            location: location.into(),
            group: group.into(),
            is_coordinator,
        }
    }

    /// Unique identifier in RINCON_xxxxx format.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// User-configured room name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device description URL.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// ID of the zone this player belongs to, if it was listed in one.
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        Some(self.group.as_str()).filter(|g| !g.is_empty())
    }

    #[must_use]
    pub fn is_coordinator(&self) -> bool {
        self.is_coordinator
    }

    /// Control endpoint parsed from the location.
    #[must_use]
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.location.parse().ok()
    }

    /// Looks up an attribute by name.
    ///
    /// Recognized names: `uuid`, `name`, `location`, `group`, `coordinator`.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        match key {
            "uuid" => Some(self.uuid()),
            "name" => Some(self.name()),
            "location" => Some(self.location()),
            "group" => self.group(),
            "coordinator" => Some(if self.is_coordinator { "true" } else { "false" }),
            _ => None,
        }
    }
}

pub type ZonePlayerPtr = Arc<ZonePlayer>;

/// Player uuid to player, for every known player.
pub type ZonePlayerList = BTreeMap<String, ZonePlayerPtr>;

// ─────────────────────────────────────────────────────────────────────────────
// Zones
// ─────────────────────────────────────────────────────────────────────────────

/// A group of players with (usually) one elected coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    id: String,
    coordinator: Option<ZonePlayerPtr>,
    members: Vec<ZonePlayerPtr>,
}

impl Zone {
    /// Creates a zone; the coordinator, if any, is also expected in `members`.
    pub fn new(
        id: impl Into<String>,
        coordinator: Option<ZonePlayerPtr>,
        members: Vec<ZonePlayerPtr>,
    ) -> Self {
        Self {
            id: id.into(),
            coordinator,
            members,
        }
    }

    /// ZoneGroup ID, e.g. `RINCON_000E58A0123401400:58`.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn coordinator(&self) -> Option<&ZonePlayerPtr> {
        self.coordinator.as_ref()
    }

    #[must_use]
    pub fn members(&self) -> &[ZonePlayerPtr] {
        &self.members
    }

    /// Display name: coordinator first, then other distinct room names.
    #[must_use]
    pub fn name(&self) -> String {
        let mut names: Vec<&str> = Vec::new();
        let ordered = self
            .coordinator
            .iter()
            .chain(self.members.iter().filter(|m| !m.is_coordinator()));
        for player in ordered {
            if !names.contains(&player.name()) {
                names.push(player.name());
            }
        }
        names.join(" + ")
    }
}

pub type ZonePtr = Arc<Zone>;

/// Zone ID to zone.
pub type ZoneList = BTreeMap<String, ZonePtr>;
