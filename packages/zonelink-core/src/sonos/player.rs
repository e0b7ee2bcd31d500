//! Control sessions bound to one zone.
//!
//! The system hands zone connection off to a [`SessionFactory`] and keeps the
//! resulting [`ControlSession`] only if it reports itself valid. The default
//! factory builds a [`SonosPlayer`], which talks to the zone coordinator and
//! follows its AVTransport events.

use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::SystemConfig;
use crate::context::NetworkContext;
use crate::events::{
    EventEmitter, EventKind, EventListener, EventMessage, EventSubscriber, SubscriberId, ZoneEvent,
};
use crate::sonos::discovery::Endpoint;
use crate::sonos::services::SonosService;
use crate::sonos::subscription::{spawn_renewal, Subscription};
use crate::sonos::traits::{SonosClient, SonosEventing, SonosTransport};
use crate::sonos::types::{TransportState, ZonePtr};
use crate::sonos::utils::{extract_empty_val_attrs, extract_xml_text};
use crate::utils::now_millis;

/// A live connection to a zone.
#[async_trait]
pub trait ControlSession: Send + Sync {
    /// Whether the session can control its zone.
    fn is_valid(&self) -> bool;

    fn zone(&self) -> ZonePtr;

    /// Releases device-side resources. The session is invalid afterwards.
    async fn close(&self);
}

/// Creates control sessions for zones.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Connects to `zone`. Failures are reported through an invalid session.
    async fn connect(
        &self,
        zone: ZonePtr,
        listener: Arc<EventListener>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Arc<dyn ControlSession>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Builds [`SonosPlayer`] sessions.
#[derive(Clone)]
pub struct SonosSessionFactory {
    transport: Arc<dyn SonosTransport>,
    eventing: Arc<dyn SonosEventing>,
    network: NetworkContext,
    lease_secs: u64,
    renewal_buffer: Duration,
}

impl SonosSessionFactory {
    pub fn new(
        transport: Arc<dyn SonosTransport>,
        eventing: Arc<dyn SonosEventing>,
        network: NetworkContext,
        lease_secs: u64,
        renewal_buffer: Duration,
    ) -> Self {
        Self {
            transport,
            eventing,
            network,
            lease_secs,
            renewal_buffer,
        }
    }

    /// Factory sharing `client` with the system.
    pub fn from_client<C: SonosClient + 'static>(client: Arc<C>, config: &SystemConfig) -> Self {
        Self::new(
            client.clone(),
            client,
            NetworkContext::from_config(config.listener.advertise_ip),
            config.subscription_lease_secs,
            Duration::from_secs(config.renewal_buffer_secs),
        )
    }
}

#[async_trait]
impl SessionFactory for SonosSessionFactory {
    async fn connect(
        &self,
        zone: ZonePtr,
        listener: Arc<EventListener>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Arc<dyn ControlSession> {
        SonosPlayer::connect(zone, self, listener, emitter).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Player
// ─────────────────────────────────────────────────────────────────────────────

/// Control session driving a zone through its coordinator.
pub struct SonosPlayer {
    zone: ZonePtr,
    coordinator: Option<Endpoint>,
    valid: AtomicBool,
    transport_state: Mutex<Option<TransportState>>,
    subscription: Option<Arc<tokio::sync::Mutex<Subscription>>>,
    renewal: Mutex<Option<CancellationToken>>,
    listener: Arc<EventListener>,
    subscriber_id: Mutex<Option<SubscriberId>>,
    emitter: Arc<dyn EventEmitter>,
}

impl fmt::Debug for SonosPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SonosPlayer")
            .field("zone", &self.zone.id())
            .field("valid", &self.is_valid())
            .field("transport_state", &*self.transport_state.lock())
            .finish()
    }
}

impl SonosPlayer {
    async fn connect(
        zone: ZonePtr,
        factory: &SonosSessionFactory,
        listener: Arc<EventListener>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Arc<dyn ControlSession> {
        let coordinator = zone.coordinator().and_then(|c| c.endpoint());
        let state = match &coordinator {
            Some(endpoint) => match factory.transport.get_transport_state(endpoint).await {
                Ok(state) => Some(state),
                Err(e) => {
                    log::warn!("[Player] Coordinator of {} not answering: {}", zone.id(), e);
                    None
                }
            },
            None => {
                log::warn!("[Player] Zone {} has no reachable coordinator", zone.id());
                None
            }
        };

        let subscription = match (&coordinator, listener.port()) {
            (Some(endpoint), Some(port)) if state.is_some() => {
                Some(Arc::new(tokio::sync::Mutex::new(Subscription::new(
                    endpoint.host(),
                    endpoint.port(),
                    SonosService::AVTransport.event_path(),
                    port,
                    factory.lease_secs,
                    factory.eventing.clone(),
                ))))
            }
            _ => None,
        };

        let player = Arc::new(Self {
            zone,
            coordinator,
            valid: AtomicBool::new(state.is_some()),
            transport_state: Mutex::new(state),
            subscription,
            renewal: Mutex::new(None),
            listener,
            subscriber_id: Mutex::new(None),
            emitter,
        });

        if player.is_valid() {
            player.follow_events(factory).await;
            log::info!(
                "[Player] Connected to {} ({:?})",
                player.zone.name(),
                player.transport_state()
            );
        }
        player
    }

    /// Registers with the listener and subscribes to AVTransport events.
    ///
    /// Registration comes first so the initial NOTIFY is not lost; its
    /// dispatch waits on the subscription lock held here.
    async fn follow_events(self: &Arc<Self>, factory: &SonosSessionFactory) {
        let (Some(subscription), Some(endpoint)) = (&self.subscription, &self.coordinator) else {
            return;
        };

        let as_subscriber: Arc<dyn EventSubscriber> = self.clone();
        let id = self.listener.create_subscription(Arc::downgrade(&as_subscriber));
        self.listener.subscribe_for_event(id, EventKind::UpnpPropChange);
        *self.subscriber_id.lock() = Some(id);

        let callback_ip: IpAddr =
            match factory.network.callback_ip_for(endpoint.host(), endpoint.port()) {
                Ok(ip) => ip,
                Err(e) => {
                    log::warn!("[Player] No callback address for {}: {}", endpoint, e);
                    return;
                }
            };

        let mut sub = subscription.lock().await;
        match sub.start(callback_ip).await {
            Ok(()) => {
                *self.renewal.lock() = Some(spawn_renewal(
                    subscription.clone(),
                    callback_ip,
                    factory.renewal_buffer,
                ));
            }
            Err(e) => {
                log::warn!("[Player] AVTransport events unavailable for {}: {}", endpoint, e)
            }
        }
    }

    /// Last transport state reported by the coordinator.
    #[must_use]
    pub fn transport_state(&self) -> Option<TransportState> {
        *self.transport_state.lock()
    }
}

/// Reads `TransportState` out of an AVTransport NOTIFY body.
pub(crate) fn parse_transport_state(body: &str) -> Option<TransportState> {
    let last_change = extract_xml_text(body, "LastChange")?;
    extract_empty_val_attrs(&last_change, &["TransportState"])
        .get("TransportState")?
        .parse()
        .ok()
}

#[async_trait]
impl EventSubscriber for SonosPlayer {
    async fn handle_event_message(&self, msg: EventMessage) {
        let Some(subscription) = &self.subscription else {
            return;
        };
        let Some(sid) = msg.sid() else {
            return;
        };
        if subscription.lock().await.sid() != Some(sid) {
            return;
        }

        let Some(state) = parse_transport_state(&msg.body) else {
            return;
        };
        let changed = self.transport_state.lock().replace(state) != Some(state);
        if changed {
            log::debug!("[Player] {} is now {}", self.zone.id(), state);
            self.emitter.emit_zone(ZoneEvent::TransportState {
                zone_id: self.zone.id().to_string(),
                state,
                timestamp: now_millis(),
            });
        }
    }
}

#[async_trait]
impl ControlSession for SonosPlayer {
    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn zone(&self) -> ZonePtr {
        self.zone.clone()
    }

    async fn close(&self) {
        self.valid.store(false, Ordering::SeqCst);
        if let Some(cancel) = self.renewal.lock().take() {
            cancel.cancel();
        }
        if let Some(id) = self.subscriber_id.lock().take() {
            self.listener.revoke_subscription(id);
        }
        if let Some(subscription) = &self.subscription {
            subscription.lock().await.stop().await;
        }
        log::info!("[Player] Closed session for {}", self.zone.id());
    }
}
