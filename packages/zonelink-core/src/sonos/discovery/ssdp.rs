//! SSDP search loop for locating one zone player.
//!
//! The M-SEARCH is re-sent whenever a read times out or fails, until a reply
//! passes every check in [`ResponseMatcher`] or the discovery window closes.
//! Devices reply unicast to the sending socket, so one socket both sends and
//! receives.

use async_trait::async_trait;
use tokio::time::Instant;

use super::line_reader::{SearchSocket, UdpLineReader};
use super::matcher::ResponseMatcher;
use super::types::{DiscoveryError, DiscoveryResult};
use crate::config::DiscoveryConfig;
use crate::sonos::traits::SonosDiscovery;

/// Build the M-SEARCH message.
///
/// The HOST header always names the multicast group.
fn build_msearch_message(config: &DiscoveryConfig) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\r\n",
        config.multicast_addr, config.mx_secs, config.search_target
    )
}

/// Runs the search loop over `socket`.
///
/// Each send starts a fresh match context. Returns the location URL of the
/// first reply that satisfies every requirement.
pub async fn search<S>(socket: &mut S, config: &DiscoveryConfig) -> DiscoveryResult<String>
where
    S: SearchSocket + ?Sized,
{
    let request = build_msearch_message(config);
    let window = config.discover_timeout();
    let deadline = Instant::now() + window;
    let mut rounds = 0u32;

    while Instant::now() < deadline {
        rounds += 1;
        socket
            .send_search(request.as_bytes())
            .await
            .map_err(DiscoveryError::SendSearch)?;
        log::debug!("[Discovery] M-SEARCH sent (round {})", rounds);

        let mut matcher = ResponseMatcher::new(config.search_target.as_str());
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let wait = remaining.min(config.read_timeout());
            let read_started = Instant::now();
            let line = match socket.read_line(wait).await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    // Pace re-sends like a timed-out read.
                    log::debug!("[Discovery] Read failed, re-sending search: {}", e);
                    tokio::time::sleep_until(read_started + wait).await;
                    break;
                }
            };
            if let Some(location) = matcher.feed(&line) {
                log::info!(
                    "[Discovery] Found zone player at {} after {} round(s)",
                    location,
                    rounds
                );
                return Ok(location);
            }
        }
    }

    log::warn!(
        "[Discovery] No zone player answered within {}ms ({} rounds)",
        window.as_millis(),
        rounds
    );
    Err(DiscoveryError::NoResponse(window))
}

/// Multicast discovery over a real UDP socket.
#[derive(Debug, Clone, Default)]
pub struct SsdpDiscovery {
    config: DiscoveryConfig,
}

impl SsdpDiscovery {
    #[must_use]
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Searches the network and returns the advertised location URL.
    pub async fn find_device_description(&self) -> DiscoveryResult<String> {
        let mut socket =
            UdpLineReader::bind(self.config.multicast_addr, self.config.multicast_ttl)
                .map_err(DiscoveryError::SocketBind)?;
        search(&mut socket, &self.config).await
    }
}

#[async_trait]
impl SonosDiscovery for SsdpDiscovery {
    async fn find_device_description(&self) -> DiscoveryResult<String> {
        SsdpDiscovery::find_device_description(self).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::time::Duration;

    use super::*;
    use crate::sonos::discovery::line_reader::LineReader;
    use crate::sonos::discovery::Endpoint;

    /// Replays one scripted batch of lines per search sent.
    struct ScriptedSocket {
        rounds: VecDeque<Vec<&'static str>>,
        current: VecDeque<&'static str>,
        sends: usize,
    }

    impl ScriptedSocket {
        fn new(rounds: Vec<Vec<&'static str>>) -> Self {
            Self {
                rounds: rounds.into(),
                current: VecDeque::new(),
                sends: 0,
            }
        }
    }

    #[async_trait]
    impl LineReader for ScriptedSocket {
        async fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>> {
            match self.current.pop_front() {
                Some(line) => Ok(Some(line.to_string())),
                None => {
                    tokio::time::sleep(timeout).await;
                    Ok(None)
                }
            }
        }
    }

    #[async_trait]
    impl SearchSocket for ScriptedSocket {
        async fn send_search(&mut self, request: &[u8]) -> io::Result<()> {
            assert!(request.starts_with(b"M-SEARCH * HTTP/1.1\r\n"));
            self.sends += 1;
            self.current = self.rounds.pop_front().unwrap_or_default().into();
            Ok(())
        }
    }

    fn zone_player_reply() -> Vec<&'static str> {
        vec![
            "HTTP/1.1 200 OK",
            "CACHE-CONTROL: max-age = 1800",
            "EXT:",
            "LOCATION: http://10.0.0.5:1400/desc.xml",
            "SERVER: Linux UPnP/1.0 Sonos/70.3-35220 (ZPS9)",
            "ST: urn:schemas-upnp-org:device:ZonePlayer:1",
            "",
        ]
    }

    fn router_reply() -> Vec<&'static str> {
        vec![
            "HTTP/1.1 200 OK",
            "LOCATION: http://10.0.0.1:49152/rootDesc.xml",
            "SERVER: Linux/5.10 UPnP/1.0 MiniUPnPd/2.2",
            "ST: urn:schemas-upnp-org:device:InternetGatewayDevice:1",
            "",
        ]
    }

    #[test]
    fn msearch_message_carries_search_target() {
        let msg = build_msearch_message(&DiscoveryConfig::default());
        assert!(msg.starts_with("M-SEARCH * HTTP/1.1\r\n"));
        assert!(msg.contains("HOST: 239.255.255.250:1900\r\n"));
        assert!(msg.contains("MAN: \"ssdp:discover\"\r\n"));
        assert!(msg.contains("MX: 1\r\n"));
        assert!(msg.contains("ST: urn:schemas-upnp-org:device:ZonePlayer:1\r\n"));
        assert!(msg.ends_with("\r\n\r\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn matching_reply_resolves_endpoint() {
        let mut socket = ScriptedSocket::new(vec![zone_player_reply()]);
        let location = search(&mut socket, &DiscoveryConfig::default())
            .await
            .unwrap();

        let endpoint: Endpoint = location.parse().unwrap();
        assert_eq!(endpoint.scheme(), "http");
        assert_eq!(endpoint.host(), "10.0.0.5");
        assert_eq!(endpoint.port(), 1400);
        assert_eq!(socket.sends, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn other_device_types_time_out() {
        let config = DiscoveryConfig::default();
        let rounds = (0..20).map(|_| router_reply()).collect();
        let mut socket = ScriptedSocket::new(rounds);

        let started = Instant::now();
        let result = search(&mut socket, &config).await;

        assert!(matches!(result, Err(DiscoveryError::NoResponse(_))));
        assert!(started.elapsed() >= config.discover_timeout());
        assert!(started.elapsed() < config.discover_timeout() + config.read_timeout());
        assert!(socket.sends > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn search_is_resent_until_a_device_answers() {
        let mut socket = ScriptedSocket::new(vec![vec![], router_reply(), zone_player_reply()]);
        let location = search(&mut socket, &DiscoveryConfig::default())
            .await
            .unwrap();
        assert_eq!(location, "http://10.0.0.5:1400/desc.xml");
        assert_eq!(socket.sends, 3);
    }

    /// Socket whose reads always fail at once.
    struct BrokenSocket {
        sends: usize,
    }

    #[async_trait]
    impl LineReader for BrokenSocket {
        async fn read_line(&mut self, _timeout: Duration) -> io::Result<Option<String>> {
            Err(io::Error::from(io::ErrorKind::ConnectionReset))
        }
    }

    #[async_trait]
    impl SearchSocket for BrokenSocket {
        async fn send_search(&mut self, _request: &[u8]) -> io::Result<()> {
            self.sends += 1;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failing_reads_resend_at_read_timeout_pace() {
        let config = DiscoveryConfig::default();
        let mut socket = BrokenSocket { sends: 0 };

        let started = Instant::now();
        let result = search(&mut socket, &config).await;

        assert!(matches!(result, Err(DiscoveryError::NoResponse(_))));
        assert!(started.elapsed() >= config.discover_timeout());
        let max_rounds = (config.discover_timeout_ms / config.read_timeout_ms) as usize;
        assert!(socket.sends <= max_rounds, "sent {} searches", socket.sends);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_match_does_not_carry_into_next_round() {
        let first = vec![
            "HTTP/1.1 200 OK",
            "ST: urn:schemas-upnp-org:device:ZonePlayer:1",
            "SERVER: Linux",
        ];
        let second = vec!["LOCATION: http://10.0.0.5:1400/desc.xml"];
        let config = DiscoveryConfig {
            discover_timeout_ms: 1200,
            ..DiscoveryConfig::default()
        };
        let mut socket = ScriptedSocket::new(vec![first, second]);
        assert!(matches!(
            search(&mut socket, &config).await,
            Err(DiscoveryError::NoResponse(_))
        ));
    }
}
