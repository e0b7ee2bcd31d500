//! Network context for building GENA callback URLs.
//!
//! Devices must be able to reach the event listener at the address we put in
//! `CALLBACK` headers. [`NetworkContext`] picks that address: an explicit
//! advertise IP from configuration wins, otherwise the interface that routes
//! towards the device, otherwise whatever [`IpDetector`] reports.

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;

/// Trait for detecting the local IP address.
///
/// Different environments may need different detection strategies.
/// This trait allows injecting the appropriate detector.
pub trait IpDetector: Send + Sync {
    /// Detects the local IP address.
    fn detect(&self) -> Result<IpAddr, NetworkError>;
}

/// Default IP detector using the system's network interfaces.
#[derive(Debug, Clone, Default)]
pub struct LocalIpDetector;

impl LocalIpDetector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Creates a new `LocalIpDetector` wrapped in an Arc.
    #[must_use]
    pub fn arc() -> Arc<dyn IpDetector> {
        Arc::new(Self::new())
    }
}

impl IpDetector for LocalIpDetector {
    fn detect(&self) -> Result<IpAddr, NetworkError> {
        local_ip_address::local_ip().map_err(|e| NetworkError::Detection(e.to_string()))
    }
}

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Could not detect local IP address.
    #[error("Failed to detect local IP: {0}")]
    Detection(String),
}

/// Resolves the callback address advertised to devices.
#[derive(Clone)]
pub struct NetworkContext {
    advertise_ip: Option<IpAddr>,
    ip_detector: Arc<dyn IpDetector>,
}

impl NetworkContext {
    /// Creates a context that always advertises `ip`.
    #[must_use]
    pub fn explicit(ip: IpAddr) -> Self {
        Self {
            advertise_ip: Some(ip),
            ip_detector: LocalIpDetector::arc(),
        }
    }

    /// Creates a context that detects the callback address per device.
    #[must_use]
    pub fn auto_detect(ip_detector: Arc<dyn IpDetector>) -> Self {
        Self {
            advertise_ip: None,
            ip_detector,
        }
    }

    /// Explicit if `advertise_ip` is set, auto-detecting otherwise.
    #[must_use]
    pub fn from_config(advertise_ip: Option<IpAddr>) -> Self {
        match advertise_ip {
            Some(ip) => Self::explicit(ip),
            None => Self::auto_detect(LocalIpDetector::arc()),
        }
    }

    /// Local address a device at `host:port` can reach us on.
    pub fn callback_ip_for(&self, host: &str, port: u16) -> Result<IpAddr, NetworkError> {
        if let Some(ip) = self.advertise_ip {
            return Ok(ip);
        }
        if let Some(ip) = route_probe(host, port) {
            return Ok(ip);
        }
        self.ip_detector.detect()
    }
}

/// Asks the OS which local address routes to the device.
///
/// Connecting a UDP socket sends nothing on the wire.
fn route_probe(host: &str, port: u16) -> Option<IpAddr> {
    let target: IpAddr = host.parse().ok()?;
    let bind: SocketAddr = if target.is_ipv4() {
        "0.0.0.0:0".parse().ok()?
    } else {
        "[::]:0".parse().ok()?
    };
    let socket = UdpSocket::bind(bind).ok()?;
    socket.connect(SocketAddr::new(target, port)).ok()?;
    let local = socket.local_addr().ok()?.ip();
    (!local.is_unspecified()).then_some(local)
}

/// Builder for URLs served by the event listener.
pub struct UrlBuilder {
    ip: IpAddr,
    port: u16,
}

impl UrlBuilder {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Returns the base URL of the listener (e.g., `http://192.168.1.20:1400`).
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", SocketAddr::new(self.ip, self.port))
    }

    /// GENA callback URL for events from the device's `event_path`.
    #[must_use]
    pub fn gena_callback_url(&self, event_path: &str) -> String {
        format!("{}/gena{}", self.base_url(), event_path)
    }
}
