//! GENA HTTP client for subscription operations.
//!
//! Handles only the HTTP protocol aspects of GENA subscriptions; lifecycle
//! (who owns a SID, when to renew) lives in [`super::subscription`].

use std::time::Duration;

use reqwest::{Client, Method};
use thiserror::Error;

/// Errors from GENA subscription requests.
#[derive(Debug, Error)]
pub enum GenaError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("subscription rejected with HTTP {0}")]
    SubscriptionFailed(u16),

    #[error("renewal rejected with HTTP {0}")]
    RenewalFailed(u16),

    #[error("subscription response carried no SID")]
    MissingSid,

    #[error("subscription is not active")]
    NotActive,
}

/// Convenient Result alias for GENA operations.
pub type GenaResult<T> = Result<T, GenaError>;

/// Response from a successful GENA subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeResponse {
    /// The subscription ID returned by the device.
    pub sid: String,
    /// The lease granted by the device, in seconds.
    pub timeout_secs: u64,
}

/// HTTP client for GENA (UPnP eventing) operations.
#[derive(Debug, Clone)]
pub struct GenaClient {
    client: Client,
    /// Per-request limit for SUBSCRIBE and UNSUBSCRIBE.
    timeout: Duration,
}

impl GenaClient {
    /// Creates a new GENA client with the given HTTP client.
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Creates the HTTP method for SUBSCRIBE requests.
    fn subscribe_method() -> Method {
        // SAFETY: "SUBSCRIBE" is a valid HTTP method name
        Method::from_bytes(b"SUBSCRIBE").expect("SUBSCRIBE is a valid method")
    }

    /// Creates the HTTP method for UNSUBSCRIBE requests.
    fn unsubscribe_method() -> Method {
        // SAFETY: "UNSUBSCRIBE" is a valid HTTP method name
        Method::from_bytes(b"UNSUBSCRIBE").expect("UNSUBSCRIBE is a valid method")
    }

    /// Parses a `Second-N` TIMEOUT header, falling back to `requested`.
    fn extract_timeout_secs(response: &reqwest::Response, requested: u64) -> u64 {
        response
            .headers()
            .get("TIMEOUT")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_timeout_header)
            .unwrap_or(requested)
    }

    /// Sends a SUBSCRIBE request to create a new subscription.
    ///
    /// # Arguments
    /// * `event_url` - Full URL of the device's event endpoint
    /// * `callback_url` - URL where NOTIFY events should be sent
    /// * `lease_secs` - Requested subscription lifetime
    pub async fn subscribe(
        &self,
        event_url: &str,
        callback_url: &str,
        lease_secs: u64,
    ) -> GenaResult<SubscribeResponse> {
        let response = self
            .client
            .request(Self::subscribe_method(), event_url)
            .header("CALLBACK", format!("<{}>", callback_url))
            .header("NT", "upnp:event")
            .header("TIMEOUT", format!("Second-{}", lease_secs))
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GenaError::SubscriptionFailed(response.status().as_u16()));
        }

        let sid = response
            .headers()
            .get("SID")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or(GenaError::MissingSid)?;

        let timeout_secs = Self::extract_timeout_secs(&response, lease_secs);

        Ok(SubscribeResponse { sid, timeout_secs })
    }

    /// Sends a SUBSCRIBE request to renew an existing subscription.
    ///
    /// Returns the lease granted by the device.
    pub async fn renew(&self, event_url: &str, sid: &str, lease_secs: u64) -> GenaResult<u64> {
        let response = self
            .client
            .request(Self::subscribe_method(), event_url)
            .header("SID", sid)
            .header("TIMEOUT", format!("Second-{}", lease_secs))
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GenaError::RenewalFailed(response.status().as_u16()));
        }

        Ok(Self::extract_timeout_secs(&response, lease_secs))
    }

    /// Sends an UNSUBSCRIBE request to cancel a subscription.
    ///
    /// Returns `false` if the request failed; the subscription should still
    /// be dropped locally.
    pub async fn unsubscribe(&self, event_url: &str, sid: &str) -> bool {
        match self
            .client
            .request(Self::unsubscribe_method(), event_url)
            .header("SID", sid)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Parses `Second-N`; `Second-infinite` and garbage yield `None`.
fn parse_timeout_header(value: &str) -> Option<u64> {
    value.trim().strip_prefix("Second-")?.parse().ok()
}
