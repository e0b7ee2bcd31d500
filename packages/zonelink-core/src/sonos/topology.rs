//! Topology cache for one household.
//!
//! [`ZoneGroupTopology`] owns the latest [`TopologySnapshot`] learned from the
//! device it was discovered through. Snapshots arrive either pushed in a
//! ZoneGroupTopology NOTIFY or pulled with `GetZoneGroupState`; both go
//! through the same parser and replace the cached snapshot wholesale.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::sonos::discovery::Endpoint;
use crate::sonos::retry::with_retry;
use crate::sonos::soap::SoapResult;
use crate::sonos::traits::SonosTopology;
use crate::sonos::types::{ZoneList, ZonePlayerList};
use crate::sonos::zone_groups::{parse_zone_group_state, parse_zone_group_xml, TopologySnapshot};

/// Cached zone and player maps plus the means to refresh them.
pub struct ZoneGroupTopology {
    device: Endpoint,
    source: Arc<dyn SonosTopology>,
    snapshot: RwLock<TopologySnapshot>,
}

impl fmt::Debug for ZoneGroupTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot.read();
        f.debug_struct("ZoneGroupTopology")
            .field("device", &self.device.to_string())
            .field("zones", &snapshot.zones.len())
            .field("players", &snapshot.players.len())
            .finish()
    }
}

impl ZoneGroupTopology {
    /// Creates an empty cache bound to `device`.
    pub fn new(device: Endpoint, source: Arc<dyn SonosTopology>) -> Self {
        Self {
            device,
            source,
            snapshot: RwLock::new(TopologySnapshot::default()),
        }
    }

    /// The device this topology is fetched from.
    #[must_use]
    pub fn device(&self) -> &Endpoint {
        &self.device
    }

    /// All zones of the current snapshot, coordinator-less ones included.
    #[must_use]
    pub fn zones(&self) -> ZoneList {
        self.snapshot.read().zones.clone()
    }

    #[must_use]
    pub fn players(&self) -> ZonePlayerList {
        self.snapshot.read().players.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> TopologySnapshot {
        self.snapshot.read().clone()
    }

    /// True until a snapshot with at least one zone has been applied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.read().zones.is_empty()
    }

    /// Replaces the cached snapshot.
    pub fn replace(&self, snapshot: TopologySnapshot) {
        log::info!(
            "[Topology] {} zone(s), {} player(s) via {}",
            snapshot.zones.len(),
            snapshot.players.len(),
            self.device
        );
        *self.snapshot.write() = snapshot;
    }

    /// Applies a ZoneGroupTopology NOTIFY body.
    ///
    /// Returns `false` (leaving the cache untouched) when the body carries no
    /// ZoneGroupState, as is the case for most other state variables.
    pub fn apply_event(&self, body: &str) -> bool {
        match parse_zone_group_state(body) {
            Some(snapshot) => {
                self.replace(snapshot);
                true
            }
            None => {
                log::debug!("[Topology] NOTIFY without ZoneGroupState ignored");
                false
            }
        }
    }

    /// Applies an already unescaped ZoneGroupState document.
    pub fn apply_state(&self, xml: &str) {
        self.replace(parse_zone_group_xml(xml));
    }

    /// Pulls the current topology from the device without touching the cache.
    pub async fn fetch(&self) -> SoapResult<TopologySnapshot> {
        let xml = self.get_zone_group_state().await?;
        Ok(parse_zone_group_xml(&xml))
    }

    /// Calls `GetZoneGroupState`, retrying transient faults.
    pub async fn get_zone_group_state(&self) -> SoapResult<String> {
        with_retry("GetZoneGroupState", || {
            self.source.get_zone_group_state(&self.device)
        })
        .await
    }
}
