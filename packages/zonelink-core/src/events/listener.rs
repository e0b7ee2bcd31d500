//! Background HTTP listener for GENA callbacks.
//!
//! One [`EventListener`] can be shared by several owners. Each owner takes a
//! [`SubscriberId`], opts in to the [`EventKind`]s it cares about, and gets
//! every matching [`EventMessage`] through [`EventSubscriber`]. Messages are
//! handed over one at a time by a single dispatcher task, so a subscriber
//! never sees two messages concurrently.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use super::message::{EventKind, EventMessage};
use crate::config::ListenerConfig;
use crate::protocol_constants::{LISTENER_STOP_PATH, MAX_GENA_BODY_SIZE};

/// Handle identifying one registration with the listener.
pub type SubscriberId = u32;

/// Receives listener messages.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn handle_event_message(&self, msg: EventMessage);
}

/// Errors from starting the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Failed to bind event listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

struct Registration {
    owner: Weak<dyn EventSubscriber>,
    kinds: HashSet<EventKind>,
}

struct Running {
    port: u16,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<EventMessage>,
}

/// Shared GENA callback server.
pub struct EventListener {
    config: ListenerConfig,
    subscribers: Arc<DashMap<SubscriberId, Registration>>,
    next_id: AtomicU32,
    running: Mutex<Option<Running>>,
}

impl EventListener {
    #[must_use]
    pub fn new(config: ListenerConfig) -> Self {
        Self {
            config,
            subscribers: Arc::new(DashMap::new()),
            next_id: AtomicU32::new(1),
            running: Mutex::new(None),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Subscribers
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers `owner`. It receives nothing until it subscribes to a kind.
    ///
    /// The listener keeps only a weak reference; a dropped owner is forgotten
    /// on the next dispatch.
    pub fn create_subscription(&self, owner: Weak<dyn EventSubscriber>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(
            id,
            Registration {
                owner,
                kinds: HashSet::new(),
            },
        );
        id
    }

    /// Opts `id` in to messages of `kind`. Returns `false` for an unknown id.
    pub fn subscribe_for_event(&self, id: SubscriberId, kind: EventKind) -> bool {
        match self.subscribers.get_mut(&id) {
            Some(mut reg) => {
                reg.kinds.insert(kind);
                true
            }
            None => false,
        }
    }

    pub fn revoke_subscription(&self, id: SubscriberId) {
        self.subscribers.remove(&id);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Bound port while running.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.running.lock().as_ref().map(|r| r.port)
    }

    /// Binds and starts serving; returns the bound port.
    ///
    /// Starting a running listener just returns its port.
    pub async fn start(&self) -> Result<u16, ListenerError> {
        if let Some(port) = self.port() {
            return Ok(port);
        }

        let addr = SocketAddr::new(self.config.bind_ip, self.config.port);
        let tcp = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;
        let port = tcp
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?
            .port();

        let mut running = self.running.lock();
        if let Some(existing) = running.as_ref() {
            // Lost a start race; the socket we bound is dropped.
            return Ok(existing.port);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(dispatch_loop(rx, Arc::clone(&self.subscribers)));

        let app = Router::new()
            .fallback(handle_request)
            .layer(TraceLayer::new_for_http())
            .with_state(tx.clone());
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            let server = axum::serve(tcp, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = server.await {
                log::error!("[Listener] Server error: {}", e);
            }
        });

        log::info!("[Listener] Listening on {}:{}", self.config.bind_ip, port);
        let _ = tx.send(EventMessage::status(true));
        *running = Some(Running { port, cancel, tx });
        Ok(port)
    }

    /// Stops serving. Subscribers receive a final `STATUS STOPPED`.
    pub fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        log::info!("[Listener] Stopping on port {}", running.port);
        let _ = running.tx.send(EventMessage::status(false));
        running.cancel.cancel();
    }

    /// Queues `msg` for dispatch as if it had arrived over HTTP.
    ///
    /// Returns `false` when the listener is not running.
    pub fn deliver(&self, msg: EventMessage) -> bool {
        match self.running.lock().as_ref() {
            Some(running) => running.tx.send(msg).is_ok(),
            None => false,
        }
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Hands each message to every live subscriber of its kind, in turn.
///
/// Ends once every sender (listener handle and HTTP server) is gone.
async fn dispatch_loop(
    mut rx: mpsc::UnboundedReceiver<EventMessage>,
    subscribers: Arc<DashMap<SubscriberId, Registration>>,
) {
    while let Some(msg) = rx.recv().await {
        let mut targets = Vec::new();
        subscribers.retain(|_, reg| match reg.owner.upgrade() {
            Some(owner) => {
                if reg.kinds.contains(&msg.kind) {
                    targets.push(owner);
                }
                true
            }
            None => false,
        });

        log::trace!(
            "[Listener] {} message {:?} to {} subscriber(s)",
            msg.kind,
            msg.subject,
            targets.len()
        );
        for target in targets {
            target.handle_event_message(msg.clone()).await;
        }
    }
    log::debug!("[Listener] Dispatcher finished");
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────────────────────────

/// Validates required GENA headers and extracts SID and SEQ values.
fn validate_gena_headers(headers: &HeaderMap) -> Option<(String, String)> {
    let nt = headers.get("NT").and_then(|v| v.to_str().ok());
    if nt != Some("upnp:event") {
        log::warn!("[GENA] NOTIFY missing or invalid NT header: {:?}", nt);
        return None;
    }

    let nts = headers.get("NTS").and_then(|v| v.to_str().ok());
    if nts != Some("upnp:propchange") {
        log::warn!("[GENA] NOTIFY missing or invalid NTS header: {:?}", nts);
        return None;
    }

    let sid = match headers.get("SID").and_then(|v| v.to_str().ok()) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => {
            log::warn!("[GENA] NOTIFY missing SID header");
            return None;
        }
    };

    // SEQ is logged, not enforced
    let seq = headers
        .get("SEQ")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("?")
        .to_string();

    Some((sid, seq))
}

async fn handle_request(
    State(tx): State<mpsc::UnboundedSender<EventMessage>>,
    req: Request<Body>,
) -> StatusCode {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();

    if parts.method.as_str() != "NOTIFY" {
        let _ = tx.send(EventMessage::unknown(parts.method.as_str(), &path));
        return if parts.method == Method::GET && path == LISTENER_STOP_PATH {
            StatusCode::OK
        } else {
            StatusCode::NOT_FOUND
        };
    }

    let Some((sid, seq)) = validate_gena_headers(&parts.headers) else {
        return StatusCode::BAD_REQUEST;
    };

    let body_bytes = match axum::body::to_bytes(body, MAX_GENA_BODY_SIZE).await {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("[GENA] Failed to read NOTIFY body: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    log::debug!("[GENA] NOTIFY from {} (SEQ: {}) on {}", sid, seq, path);
    let body = String::from_utf8_lossy(&body_bytes).into_owned();
    let _ = tx.send(EventMessage::prop_change(&sid, &seq, &path, body));
    StatusCode::OK
}
