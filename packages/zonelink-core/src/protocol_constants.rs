//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by external specifications (SSDP, UPnP GENA) or by
//! the zone player firmware, and changing them would break protocol compliance.
//! Tunable timeouts live in [`crate::config`] and default to the values here.

// ─────────────────────────────────────────────────────────────────────────────
// SSDP Discovery
// ─────────────────────────────────────────────────────────────────────────────

use std::net::Ipv4Addr;

/// Standard SSDP multicast group.
pub const SSDP_MULTICAST_IP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

pub const SSDP_PORT: u16 = 1900;

/// Search target identifying zone players.
pub const ZONE_PLAYER_SEARCH_TARGET: &str = "urn:schemas-upnp-org:device:ZonePlayer:1";

/// MX value sent with each M-SEARCH (seconds a device may delay its reply).
pub const SSDP_MX_SECS: u64 = 1;

/// UPnP 1.0 recommends a multicast TTL of 4 for SSDP.
pub const SSDP_MULTICAST_TTL: u32 = 4;

/// Overall discovery window (milliseconds).
pub const DISCOVER_TIMEOUT_MS: u64 = 5000;

/// Per-read socket timeout (milliseconds).
///
/// Short enough that the search is re-sent several times within the
/// discovery window.
pub const SSDP_READ_TIMEOUT_MS: u64 = 500;

/// Header tokens are compared on at most this many bytes.
pub const HTTP_TOKEN_MAX_LEN: usize = 20;

/// Byte length of an HTTP/1.x status line with a three letter reason,
/// e.g. `HTTP/1.1 200 OK`.
pub const HTTP_STATUS_LINE_LEN: usize = 15;

/// Largest UDP datagram accepted from a responder.
pub const SSDP_MAX_DATAGRAM: usize = 2048;

// ─────────────────────────────────────────────────────────────────────────────
// GENA (UPnP General Event Notification Architecture)
// ─────────────────────────────────────────────────────────────────────────────

/// GENA subscription lease requested from the device (seconds).
pub const GENA_SUBSCRIPTION_TIMEOUT_SECS: u64 = 3600;

/// Time before lease expiry to trigger renewal (seconds).
pub const GENA_RENEWAL_BUFFER_SECS: u64 = 300;

/// Shortest renewal interval the renewal task will sleep for (seconds).
pub const GENA_MIN_RENEWAL_INTERVAL_SECS: u64 = 30;

/// Maximum size of a GENA notification body (bytes).
///
/// ZoneGroupState documents for large households run past 64 KiB.
pub const MAX_GENA_BODY_SIZE: usize = 512 * 1024;

/// How long to wait for the first topology notification before pulling the
/// state manually (milliseconds).
pub const FIRST_SNAPSHOT_TIMEOUT_MS: u64 = 5000;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP/SOAP
// ─────────────────────────────────────────────────────────────────────────────

/// Timeout for SOAP HTTP requests (seconds).
///
/// 10 seconds is reasonable for LAN operations.
pub const SOAP_TIMEOUT_SECS: u64 = 10;

/// Default port of the local event listener.
pub const DEFAULT_LISTENER_PORT: u16 = 1400;

/// Request path on the event listener that asks it to shut down.
pub const LISTENER_STOP_PATH: &str = "/stop";
