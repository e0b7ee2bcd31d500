//! Zone group topology parsing.
//!
//! Turns a ZoneGroupState document into zone and player maps. The same
//! parser serves the SOAP `GetZoneGroupState` response and GENA NOTIFY
//! bodies.

use std::sync::Arc;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::sonos::types::{Zone, ZoneList, ZonePlayer, ZonePlayerList};
use crate::sonos::utils::{extract_xml_text, get_xml_attr};

/// Zones and players decoded from one ZoneGroupState document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologySnapshot {
    /// Every zone with at least one member, coordinator elected or not.
    pub zones: ZoneList,
    /// Every player listed in some zone.
    pub players: ZonePlayerList,
}

/// Member attributes collected while inside a ZoneGroup.
struct PendingMember {
    uuid: String,
    name: String,
    location: String,
}

/// Parses ZoneGroupState XML (already unescaped).
///
/// # Filtering
/// - Zone Bridges (BOOST devices with `IsZoneBridge="1"`) are skipped as
///   they cannot play audio.
/// - Members without `UUID` or `Location` are skipped.
/// - Groups left without members are dropped.
///
/// A group whose `Coordinator` is not among its remaining members is kept,
/// with no coordinator.
pub fn parse_zone_group_xml(xml: &str) -> TopologySnapshot {
    let mut snapshot = TopologySnapshot::default();
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut group_id = String::new();
    let mut coordinator_uuid: Option<String> = None;
    let mut members: Vec<PendingMember> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"ZoneGroup" => {
                    group_id = get_xml_attr(e, b"ID").unwrap_or_default();
                    coordinator_uuid = get_xml_attr(e, b"Coordinator");
                    members.clear();
                }
                b"ZoneGroupMember" => {
                    if get_xml_attr(e, b"IsZoneBridge").as_deref() == Some("1") {
                        continue;
                    }
                    let (Some(uuid), Some(location)) =
                        (get_xml_attr(e, b"UUID"), get_xml_attr(e, b"Location"))
                    else {
                        continue;
                    };
                    members.push(PendingMember {
                        uuid,
                        name: get_xml_attr(e, b"ZoneName").unwrap_or_default(),
                        location,
                    });
                }
                _ => {}
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"ZoneGroup" => {
                finish_group(
                    &mut snapshot,
                    std::mem::take(&mut group_id),
                    coordinator_uuid.take(),
                    std::mem::take(&mut members),
                );
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("[Topology] XML parse error in zone groups: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    snapshot
}

fn finish_group(
    snapshot: &mut TopologySnapshot,
    group_id: String,
    coordinator_uuid: Option<String>,
    members: Vec<PendingMember>,
) {
    if members.is_empty() || group_id.is_empty() {
        return;
    }

    let players: Vec<_> = members
        .into_iter()
        .map(|m| {
            let is_coordinator = coordinator_uuid.as_deref() == Some(m.uuid.as_str());
            Arc::new(ZonePlayer::new(
                m.uuid,
                m.name,
                m.location,
                group_id.clone(),
                is_coordinator,
            ))
        })
        .collect();

    let coordinator = players.iter().find(|p| p.is_coordinator()).cloned();
    if coordinator.is_none() {
        log::debug!("[Topology] Zone {} has no coordinator", group_id);
    }

    for player in &players {
        snapshot
            .players
            .insert(player.uuid().to_string(), player.clone());
    }
    snapshot
        .zones
        .insert(group_id.clone(), Arc::new(Zone::new(group_id, coordinator, players)));
}

/// Parses the ZoneGroupState carried in a SOAP response or GENA propertyset.
///
/// Returns `None` when the document does not contain a ZoneGroupState.
pub fn parse_zone_group_state(document: &str) -> Option<TopologySnapshot> {
    let state = extract_xml_text(document, "ZoneGroupState")?;
    Some(parse_zone_group_xml(&state))
}
