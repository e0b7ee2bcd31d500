//! Shared test fixtures for topology documents and GENA payloads.

use super::utils::escape_xml;

/// `<ZoneGroupMember>` for a player at `ip`.
pub fn member_xml(uuid: &str, ip: &str, name: &str) -> String {
    member_xml_at(uuid, &format!("{ip}:1400"), name)
}

/// `<ZoneGroupMember>` for a player serving at `authority` (`host:port`).
pub fn member_xml_at(uuid: &str, authority: &str, name: &str) -> String {
    format!(
        r#"<ZoneGroupMember UUID="{uuid}" Location="http://{authority}/xml/device_description.xml" ZoneName="{name}" Icon="x-rincon-roomicon:living" SoftwareVersion="79.1-56030"/>"#
    )
}

/// `<ZoneGroup>` wrapping pre-rendered members.
pub fn zone_group_xml(id: &str, coordinator: &str, members: &[String]) -> String {
    format!(
        r#"<ZoneGroup Coordinator="{coordinator}" ID="{id}">{}</ZoneGroup>"#,
        members.concat()
    )
}

/// Unescaped ZoneGroupState document.
pub fn zone_group_state_xml(groups: &[String]) -> String {
    format!(
        "<ZoneGroupState><ZoneGroups>{}</ZoneGroups><VanishedDevices></VanishedDevices></ZoneGroupState>",
        groups.concat()
    )
}

/// ZoneGroupTopology NOTIFY body carrying `state`.
pub fn zgt_notify_body(state: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property><AreasUpdateID>RINCON_A01400,0</AreasUpdateID></e:property>
  <e:property><ZoneGroupState>{}</ZoneGroupState></e:property>
  <e:property><ZoneGroupName>Living Room</ZoneGroupName></e:property>
</e:propertyset>"#,
        escape_xml(state)
    )
}

/// GetZoneGroupState SOAP response carrying `state`.
pub fn zone_group_state_response(state: &str) -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:GetZoneGroupStateResponse xmlns:u="urn:schemas-upnp-org:service:ZoneGroupTopology:1"><ZoneGroupState>{}</ZoneGroupState></u:GetZoneGroupStateResponse></s:Body></s:Envelope>"#,
        escape_xml(state)
    )
}

/// GetTransportInfo SOAP response reporting `state`.
pub fn transport_info_response(state: &str) -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:GetTransportInfoResponse xmlns:u="urn:schemas-upnp-org:service:AVTransport:1"><CurrentTransportState>{state}</CurrentTransportState><CurrentTransportStatus>OK</CurrentTransportStatus><CurrentSpeed>1</CurrentSpeed></u:GetTransportInfoResponse></s:Body></s:Envelope>"#
    )
}

/// Single-zone household: `RINCON_A` coordinates `RINCON_A:1` with `RINCON_B`.
pub fn two_player_state() -> String {
    zone_group_state_xml(&[zone_group_xml(
        "RINCON_A:1",
        "RINCON_A",
        &[
            member_xml("RINCON_A", "10.0.0.5", "Living Room"),
            member_xml("RINCON_B", "10.0.0.6", "Kitchen"),
        ],
    )])
}

/// ZoneGroupTopology NOTIFY that only reports unrelated variables.
pub const ZGT_NOTIFY_WITHOUT_STATE: &str = r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property><AvailableSoftwareUpdate>&lt;UpdateItem/&gt;</AvailableSoftwareUpdate></e:property>
</e:propertyset>"#;

/// AVTransport NOTIFY with transport state PLAYING.
pub const AV_TRANSPORT_NOTIFY_PLAYING: &str = r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property>
    <LastChange>&lt;Event xmlns=&quot;urn:schemas-upnp-org:metadata-1-0/AVT/&quot;&gt;
      &lt;InstanceID val=&quot;0&quot;&gt;
        &lt;TransportState val=&quot;PLAYING&quot;/&gt;
        &lt;CurrentPlayMode val=&quot;NORMAL&quot;/&gt;
      &lt;/InstanceID&gt;
    &lt;/Event&gt;</LastChange>
  </e:property>
</e:propertyset>"#;
