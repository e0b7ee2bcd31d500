//! Line-oriented access to SSDP replies.
//!
//! The discovery engine only sees [`SearchSocket`]: it sends a request and
//! reads back lines, each without its CRLF terminator and with `len()` equal
//! to its exact byte length. [`UdpLineReader`] is the network implementation;
//! tests drive the engine with scripted readers.

use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::protocol_constants::SSDP_MAX_DATAGRAM;

/// Source of response lines.
#[async_trait]
pub trait LineReader: Send {
    /// Reads the next line, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    async fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>>;
}

/// A [`LineReader`] that can also emit the search request.
#[async_trait]
pub trait SearchSocket: LineReader {
    /// Sends one search datagram to the discovery group.
    async fn send_search(&mut self, request: &[u8]) -> io::Result<()>;
}

/// UDP socket that splits each received datagram into lines.
pub struct UdpLineReader {
    socket: UdpSocket,
    target: SocketAddr,
    pending: VecDeque<String>,
    buf: Vec<u8>,
}

impl UdpLineReader {
    /// Binds an ephemeral socket for searching `target`.
    ///
    /// Sets up socket options for SSDP discovery:
    /// - SO_REUSEADDR for rapid restarts
    /// - SO_REUSEPORT on Unix
    /// - multicast TTL of `ttl`
    pub fn bind(target: SocketAddr, ttl: u32) -> io::Result<Self> {
        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

        if let Err(e) = socket.set_reuse_address(true) {
            log::warn!("[Discovery] Failed to set SO_REUSEADDR: {}", e);
        }

        #[cfg(unix)]
        if let Err(e) = socket.set_reuse_port(true) {
            log::warn!("[Discovery] Failed to set SO_REUSEPORT: {}", e);
        }

        if let Err(e) = socket.set_multicast_ttl_v4(ttl) {
            log::warn!("[Discovery] Failed to set multicast TTL: {}", e);
        }

        socket.set_nonblocking(true)?;
        socket.bind(&bind_addr.into())?;

        let std_socket: std::net::UdpSocket = socket.into();
        Ok(Self {
            socket: UdpSocket::from_std(std_socket)?,
            target,
            pending: VecDeque::new(),
            buf: vec![0u8; SSDP_MAX_DATAGRAM],
        })
    }

    fn queue_datagram(&mut self, len: usize, from: SocketAddr) {
        let text = String::from_utf8_lossy(&self.buf[..len]);
        log::trace!("[Discovery] {} bytes from {}", len, from);
        self.pending.extend(text.lines().map(str::to_owned));
    }
}

#[async_trait]
impl LineReader for UdpLineReader {
    async fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>> {
        if let Some(line) = self.pending.pop_front() {
            return Ok(Some(line));
        }
        match tokio::time::timeout(timeout, self.socket.recv_from(&mut self.buf)).await {
            Ok(Ok((len, from))) => {
                self.queue_datagram(len, from);
                Ok(self.pending.pop_front())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }
}

#[async_trait]
impl SearchSocket for UdpLineReader {
    async fn send_search(&mut self, request: &[u8]) -> io::Result<()> {
        self.socket.send_to(request, self.target).await.map(|_| ())
    }
}
