//! One GENA subscription and its lifecycle.
//!
//! A [`Subscription`] targets one event path on one device and delivers to
//! one local callback port. `start` registers it, `renew` extends the lease,
//! `stop` cancels it. The owner decides when each happens.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::context::UrlBuilder;
use crate::protocol_constants::GENA_MIN_RENEWAL_INTERVAL_SECS;
use crate::sonos::gena_client::{GenaError, GenaResult};
use crate::sonos::traits::SonosEventing;

/// A time-bounded registration for events from a remote event source.
pub struct Subscription {
    remote_host: String,
    remote_port: u16,
    event_path: String,
    callback_port: u16,
    lease_secs: u64,
    eventing: Arc<dyn SonosEventing>,
    sid: Option<String>,
    granted_secs: u64,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("remote", &format_args!("{}:{}", self.remote_host, self.remote_port))
            .field("event_path", &self.event_path)
            .field("callback_port", &self.callback_port)
            .field("sid", &self.sid)
            .field("granted_secs", &self.granted_secs)
            .finish()
    }
}

impl Subscription {
    /// Creates an inactive subscription.
    pub fn new(
        remote_host: impl Into<String>,
        remote_port: u16,
        event_path: impl Into<String>,
        callback_port: u16,
        lease_secs: u64,
        eventing: Arc<dyn SonosEventing>,
    ) -> Self {
        Self {
            remote_host: remote_host.into(),
            remote_port,
            event_path: event_path.into(),
            callback_port,
            lease_secs,
            eventing,
            sid: None,
            granted_secs: 0,
        }
    }

    #[must_use]
    pub fn remote_host(&self) -> &str {
        &self.remote_host
    }

    #[must_use]
    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    #[must_use]
    pub fn event_path(&self) -> &str {
        &self.event_path
    }

    #[must_use]
    pub fn callback_port(&self) -> u16 {
        self.callback_port
    }

    /// Subscription ID assigned by the device while active.
    #[must_use]
    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.sid.is_some()
    }

    /// Full URL of the remote event source.
    #[must_use]
    pub fn event_url(&self) -> String {
        if self.remote_host.contains(':') {
            format!("http://[{}]:{}{}", self.remote_host, self.remote_port, self.event_path)
        } else {
            format!("http://{}:{}{}", self.remote_host, self.remote_port, self.event_path)
        }
    }

    /// How long to wait before renewing, `buffer` ahead of lease expiry.
    #[must_use]
    pub fn renewal_interval(&self, buffer: Duration) -> Duration {
        let lease = if self.granted_secs > 0 {
            self.granted_secs
        } else {
            self.lease_secs
        };
        Duration::from_secs(lease)
            .saturating_sub(buffer)
            .max(Duration::from_secs(GENA_MIN_RENEWAL_INTERVAL_SECS))
    }

    /// Registers with the device; events go to `callback_ip` on the callback port.
    ///
    /// An already active subscription is cancelled first.
    pub async fn start(&mut self, callback_ip: IpAddr) -> GenaResult<()> {
        if self.is_active() {
            self.stop().await;
        }

        let callback_url =
            UrlBuilder::new(callback_ip, self.callback_port).gena_callback_url(&self.event_path);
        let event_url = self.event_url();
        let response = self
            .eventing
            .subscribe(&event_url, &callback_url, self.lease_secs)
            .await?;

        log::info!(
            "[GENA] Subscribed to {} (SID {}, lease {}s, callback {})",
            event_url,
            response.sid,
            response.timeout_secs,
            callback_url
        );
        self.sid = Some(response.sid);
        self.granted_secs = response.timeout_secs;
        Ok(())
    }

    /// Extends the lease of the active subscription.
    ///
    /// A rejected renewal deactivates the subscription; the caller has to
    /// `start` it again.
    pub async fn renew(&mut self) -> GenaResult<()> {
        let sid = self.sid.clone().ok_or(GenaError::NotActive)?;
        match self
            .eventing
            .renew(&self.event_url(), &sid, self.lease_secs)
            .await
        {
            Ok(granted) => {
                log::debug!("[GENA] Renewed {} for {}s", sid, granted);
                self.granted_secs = granted;
                Ok(())
            }
            Err(e) => {
                log::warn!("[GENA] Renewal of {} failed: {}", sid, e);
                if matches!(e, GenaError::RenewalFailed(_)) {
                    self.sid = None;
                }
                Err(e)
            }
        }
    }

    /// Cancels the subscription (best effort) and marks it inactive.
    ///
    /// Returns `true` if there was an active subscription and the device
    /// confirmed the cancellation.
    pub async fn stop(&mut self) -> bool {
        let Some(sid) = self.sid.take() else {
            return false;
        };
        self.granted_secs = 0;
        let confirmed = self.eventing.unsubscribe(&self.event_url(), &sid).await;
        if confirmed {
            log::info!("[GENA] Unsubscribed {}", sid);
        } else {
            log::warn!("[GENA] Unsubscribe of {} not confirmed", sid);
        }
        confirmed
    }
}

/// Keeps `subscription` alive until the returned token is cancelled.
///
/// Renews `buffer` ahead of each lease expiry. A failed renewal falls back to
/// a fresh SUBSCRIBE towards `callback_ip`.
pub fn spawn_renewal(
    subscription: Arc<Mutex<Subscription>>,
    callback_ip: IpAddr,
    buffer: Duration,
) -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        loop {
            let interval = subscription.lock().await.renewal_interval(buffer);
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let mut sub = subscription.lock().await;
            if token.is_cancelled() {
                break;
            }
            if sub.renew().await.is_ok() {
                continue;
            }
            if let Err(e) = sub.start(callback_ip).await {
                log::warn!(
                    "[GENA] Re-subscribe to {} failed, retrying later: {}",
                    sub.event_url(),
                    e
                );
            }
        }
        log::debug!("[GENA] Renewal task finished");
    });
    cancel
}
