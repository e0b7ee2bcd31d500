//! The household control plane.
//!
//! [`SonosSystem`] discovers a zone player, keeps the household topology
//! current through a ZoneGroupTopology subscription, and tracks the zone the
//! caller is connected to.
//!
//! # Locking
//!
//! One async mutex guards the subscription, the topology handle and the
//! connected slot. It is never held while waiting for the first topology
//! notification, so the listener's dispatcher can take it to apply the
//! notification that ends the wait.

use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::SystemConfig;
use crate::context::NetworkContext;
use crate::error::{SystemError, SystemResult};
use crate::events::{
    EventEmitter, EventKind, EventListener, EventMessage, EventSubscriber, ListenerEvent,
    LoggingEventEmitter, SubscriberId, TopologyEvent, ZoneEvent, ZoneSummary,
};
use crate::sonos::discovery::{DiscoveryError, Endpoint};
use crate::sonos::player::{ControlSession, SessionFactory, SonosSessionFactory};
use crate::sonos::services::SonosService;
use crate::sonos::subscription::{spawn_renewal, Subscription};
use crate::sonos::topology::ZoneGroupTopology;
use crate::sonos::traits::{SonosClient, SonosDiscovery, SonosEventing, SonosTopology};
use crate::sonos::types::{ZoneList, ZonePlayer, ZonePlayerList, ZonePtr};
use crate::sonos::SonosClientImpl;
use crate::utils::now_millis;

/// How the first topology snapshot after discovery arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapshotSource {
    /// Pushed by the device in a ZoneGroupTopology NOTIFY.
    Notification,
    /// Pulled with `GetZoneGroupState` after the wait ran out.
    ManualFetch,
}

/// The zone the system is connected to and its control session.
#[derive(Clone)]
pub struct ConnectedZone {
    pub zone: ZonePtr,
    pub player: Arc<dyn ControlSession>,
}

impl fmt::Debug for ConnectedZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectedZone")
            .field("zone", &self.zone.id())
            .field("valid", &self.player.is_valid())
            .finish()
    }
}

#[derive(Default)]
struct SystemState {
    subscription: Option<Arc<Mutex<Subscription>>>,
    renewal: Option<CancellationToken>,
    topology: Option<Arc<ZoneGroupTopology>>,
    connected: Option<ConnectedZone>,
}

struct SystemInner {
    state: Mutex<SystemState>,
    /// Generation counter bumped whenever a snapshot is applied.
    signal: watch::Sender<u64>,
    listener: Arc<EventListener>,
    subscriber_id: parking_lot::Mutex<Option<SubscriberId>>,
    discovery: Arc<dyn SonosDiscovery>,
    eventing: Arc<dyn SonosEventing>,
    topology_source: Arc<dyn SonosTopology>,
    sessions: Arc<dyn SessionFactory>,
    emitter: Arc<dyn EventEmitter>,
    network: NetworkContext,
    config: SystemConfig,
}

/// Discovery, topology cache and connected-zone state for one household.
pub struct SonosSystem {
    inner: Arc<SystemInner>,
}

impl fmt::Debug for SonosSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SonosSystem")
            .field("listener_port", &self.inner.listener.port())
            .field("generation", &*self.inner.signal.borrow())
            .finish()
    }
}

impl SonosSystem {
    /// Creates a system from its collaborators.
    ///
    /// The system registers with `listener` right away but only starts it
    /// when discovering or connecting.
    pub fn new<C: SonosClient + 'static>(
        client: Arc<C>,
        sessions: Arc<dyn SessionFactory>,
        listener: Arc<EventListener>,
        emitter: Arc<dyn EventEmitter>,
        config: SystemConfig,
    ) -> Self {
        let (signal, _) = watch::channel(0);
        let inner = Arc::new(SystemInner {
            state: Mutex::new(SystemState::default()),
            signal,
            listener: listener.clone(),
            subscriber_id: parking_lot::Mutex::new(None),
            discovery: client.clone(),
            eventing: client.clone(),
            topology_source: client,
            sessions,
            emitter,
            network: NetworkContext::from_config(config.listener.advertise_ip),
            config,
        });

        let as_subscriber: Arc<dyn EventSubscriber> = inner.clone();
        let weak: Weak<dyn EventSubscriber> = Arc::downgrade(&as_subscriber);
        let id = listener.create_subscription(weak);
        for kind in [EventKind::HandlerStatus, EventKind::Unknown, EventKind::UpnpPropChange] {
            listener.subscribe_for_event(id, kind);
        }
        *inner.subscriber_id.lock() = Some(id);

        Self { inner }
    }

    /// Creates a system talking to the network with default collaborators.
    ///
    /// Every request made through the shared HTTP client is bounded by
    /// `soap_timeout_secs`.
    pub fn with_config(config: SystemConfig) -> SystemResult<Self> {
        let http = create_http_client(&config)?;
        let client = Arc::new(SonosClientImpl::new(http, &config));
        let sessions = Arc::new(SonosSessionFactory::from_client(client.clone(), &config));
        let listener = Arc::new(EventListener::new(config.listener.clone()));
        Ok(Self::new(
            client,
            sessions,
            listener,
            Arc::new(LoggingEventEmitter),
            config,
        ))
    }

    #[must_use]
    pub fn listener(&self) -> &Arc<EventListener> {
        &self.inner.listener
    }

    /// Receiver whose value changes every time a topology snapshot is applied.
    #[must_use]
    pub fn topology_updates(&self) -> watch::Receiver<u64> {
        self.inner.signal.subscribe()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Discovery
    // ─────────────────────────────────────────────────────────────────────────

    /// Finds a zone player and establishes the household topology through it.
    pub async fn discover(&self) -> SystemResult<SnapshotSource> {
        let endpoint = match self.inner.discovery.discover_endpoint().await {
            Ok(endpoint) => endpoint,
            Err(DiscoveryError::MalformedLocation(e)) => {
                return Err(SystemError::MalformedEndpoint(e));
            }
            Err(e) => return Err(e.into()),
        };
        log::info!("[System] Zone player found at {}", endpoint);
        self.establish(endpoint).await
    }

    /// Subscribes to topology events from `endpoint` and waits for the first
    /// snapshot, pulling it manually if no notification arrives in time.
    ///
    /// Any previous subscription is cancelled first.
    pub async fn establish(&self, endpoint: Endpoint) -> SystemResult<SnapshotSource> {
        let (topology, pending) = {
            let mut state = self.inner.state.lock().await;
            self.inner.teardown_subscription(&mut state).await;

            let topology = Arc::new(ZoneGroupTopology::new(
                endpoint.clone(),
                self.inner.topology_source.clone(),
            ));
            state.topology = Some(topology.clone());

            let updates = self.inner.signal.subscribe();
            let subscribed = self.inner.subscribe_topology(&mut state, &endpoint).await;
            (topology, subscribed.then_some(updates))
        };

        if let Some(mut updates) = pending {
            let timeout = self.inner.config.callback_timeout();
            if let Ok(Ok(())) = tokio::time::timeout(timeout, updates.changed()).await {
                log::info!("[System] Topology received by notification");
                return Ok(SnapshotSource::Notification);
            }
            log::warn!(
                "[System] No topology notification within {}ms, fetching manually",
                timeout.as_millis()
            );
        }

        let snapshot = topology.fetch().await?;
        let state = self.inner.state.lock().await;
        let current = state
            .topology
            .as_ref()
            .is_some_and(|t| Arc::ptr_eq(t, &topology));
        if current {
            topology.replace(snapshot);
            drop(state);
            self.inner.publish(&topology, SnapshotSource::ManualFetch);
        } else {
            log::debug!("[System] Manual fetch superseded by a newer discovery");
        }
        Ok(SnapshotSource::ManualFetch)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Topology
    // ─────────────────────────────────────────────────────────────────────────

    /// Zones that have a coordinator.
    pub async fn list_zones(&self) -> ZoneList {
        let state = self.inner.state.lock().await;
        state
            .topology
            .as_ref()
            .map(|t| {
                t.zones()
                    .into_iter()
                    .filter(|(_, zone)| zone.coordinator().is_some())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn list_players(&self) -> ZonePlayerList {
        let state = self.inner.state.lock().await;
        state
            .topology
            .as_ref()
            .map(|t| t.players())
            .unwrap_or_default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection
    // ─────────────────────────────────────────────────────────────────────────

    /// Connects to `zone`, replacing the current connection only on success.
    ///
    /// `emitter` receives the session's zone events.
    pub async fn connect_zone(
        &self,
        zone: ZonePtr,
        emitter: Arc<dyn EventEmitter>,
    ) -> SystemResult<()> {
        let mut state = self.inner.state.lock().await;
        self.inner.connect_locked(&mut state, zone, emitter).await
    }

    /// Connects to the zone `player` currently belongs to.
    pub async fn connect_zone_player(
        &self,
        player: &ZonePlayer,
        emitter: Arc<dyn EventEmitter>,
    ) -> SystemResult<()> {
        let mut state = self.inner.state.lock().await;
        let topology = state.topology.clone().ok_or(SystemError::NotDiscovered)?;
        let group = player.group().unwrap_or_default();
        let zone = topology
            .zones()
            .get(group)
            .cloned()
            .ok_or_else(|| SystemError::UnknownGroup(group.to_string()))?;
        self.inner.connect_locked(&mut state, zone, emitter).await
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.state.lock().await.connected.is_some()
    }

    pub async fn connected_zone(&self) -> Option<ConnectedZone> {
        self.inner.state.lock().await.connected.clone()
    }

    /// Cancels the topology subscription, closes the connected session and
    /// detaches from the listener, stopping it if nobody else uses it.
    pub async fn shutdown(&self) {
        let connected = {
            let mut state = self.inner.state.lock().await;
            self.inner.teardown_subscription(&mut state).await;
            state.connected.take()
        };
        if let Some(connected) = connected {
            connected.player.close().await;
            self.inner.emitter.emit_zone(ZoneEvent::Disconnected {
                zone_id: connected.zone.id().to_string(),
                timestamp: now_millis(),
            });
        }

        if let Some(id) = self.inner.subscriber_id.lock().take() {
            self.inner.listener.revoke_subscription(id);
        }
        stop_if_unused(&self.inner.listener);
        log::info!("[System] Shut down");
    }
}

impl Drop for SonosSystem {
    /// Best-effort version of [`SonosSystem::shutdown`].
    ///
    /// UNSUBSCRIBE and session close need a runtime; without one the lease
    /// is left to expire on the device.
    fn drop(&mut self) {
        let (subscription, connected) = match self.inner.state.try_lock() {
            Ok(mut state) => {
                if let Some(cancel) = state.renewal.take() {
                    cancel.cancel();
                }
                (state.subscription.take(), state.connected.take())
            }
            Err(_) => (None, None),
        };
        if let Some(id) = self.inner.subscriber_id.lock().take() {
            self.inner.listener.revoke_subscription(id);
        }

        let listener = self.inner.listener.clone();
        if subscription.is_none() && connected.is_none() {
            stop_if_unused(&listener);
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Some(subscription) = subscription {
                        subscription.lock().await.stop().await;
                    }
                    if let Some(connected) = connected {
                        connected.player.close().await;
                    }
                    stop_if_unused(&listener);
                });
            }
            Err(_) => {
                log::warn!("[System] Dropped outside a runtime, subscription left to expire");
                stop_if_unused(&listener);
            }
        }
    }
}

fn stop_if_unused(listener: &EventListener) {
    if listener.subscriber_count() == 0 {
        listener.stop();
    }
}

/// Creates the HTTP client shared by SOAP and GENA requests.
fn create_http_client(config: &SystemConfig) -> SystemResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.soap_timeout())
        .build()
        .map_err(SystemError::HttpClient)
}

impl SystemInner {
    /// Cancels renewal and UNSUBSCRIBEs the topology subscription, if any.
    async fn teardown_subscription(&self, state: &mut SystemState) {
        if let Some(cancel) = state.renewal.take() {
            cancel.cancel();
        }
        if let Some(subscription) = state.subscription.take() {
            subscription.lock().await.stop().await;
        }
    }

    /// Starts a topology subscription on `endpoint`; `false` when the push
    /// path is unavailable.
    async fn subscribe_topology(&self, state: &mut SystemState, endpoint: &Endpoint) -> bool {
        let port = match self.listener.start().await {
            Ok(port) => port,
            Err(e) => {
                log::warn!("[System] Event listener unavailable: {}", e);
                return false;
            }
        };
        let callback_ip: IpAddr =
            match self.network.callback_ip_for(endpoint.host(), endpoint.port()) {
                Ok(ip) => ip,
                Err(e) => {
                    log::warn!("[System] No callback address for {}: {}", endpoint, e);
                    return false;
                }
            };

        let mut subscription = Subscription::new(
            endpoint.host(),
            endpoint.port(),
            SonosService::ZoneGroupTopology.event_path(),
            port,
            self.config.subscription_lease_secs,
            self.eventing.clone(),
        );
        if let Err(e) = subscription.start(callback_ip).await {
            log::warn!("[System] Topology subscription failed: {}", e);
            return false;
        }

        let subscription = Arc::new(Mutex::new(subscription));
        state.renewal = Some(spawn_renewal(
            subscription.clone(),
            callback_ip,
            Duration::from_secs(self.config.renewal_buffer_secs),
        ));
        state.subscription = Some(subscription);
        true
    }

    async fn connect_locked(
        &self,
        state: &mut SystemState,
        zone: ZonePtr,
        emitter: Arc<dyn EventEmitter>,
    ) -> SystemResult<()> {
        self.listener.start().await?;
        if zone.coordinator().is_none() {
            return Err(SystemError::EmptyZone(zone.id().to_string()));
        }

        let session = self
            .sessions
            .connect(zone.clone(), self.listener.clone(), emitter)
            .await;
        if !session.is_valid() {
            session.close().await;
            return Err(SystemError::InvalidSession(zone.id().to_string()));
        }

        let previous = state.connected.replace(ConnectedZone {
            zone: zone.clone(),
            player: session,
        });
        if let Some(previous) = previous {
            previous.player.close().await;
            self.emitter.emit_zone(ZoneEvent::Disconnected {
                zone_id: previous.zone.id().to_string(),
                timestamp: now_millis(),
            });
        }

        log::info!("[System] Connected to zone {}", zone.name());
        self.emitter.emit_zone(ZoneEvent::Connected {
            zone: ZoneSummary::from(zone.as_ref()),
            timestamp: now_millis(),
        });
        Ok(())
    }

    /// Releases waiters and tells observers about the applied snapshot.
    fn publish(&self, topology: &ZoneGroupTopology, source: SnapshotSource) {
        self.signal.send_modify(|generation| *generation += 1);
        let zones = topology
            .zones()
            .values()
            .filter(|zone| zone.coordinator().is_some())
            .map(|zone| ZoneSummary::from(zone.as_ref()))
            .collect();
        self.emitter.emit_topology(TopologyEvent::Updated {
            zones,
            source,
            timestamp: now_millis(),
        });
    }

    async fn apply_notification(&self, msg: &EventMessage) {
        let Some(sid) = msg.sid() else {
            return;
        };

        let state = self.state.lock().await;
        let (Some(subscription), Some(topology)) = (&state.subscription, &state.topology) else {
            return;
        };
        if subscription.lock().await.sid() != Some(sid) {
            log::trace!("[System] NOTIFY for {} is not ours", sid);
            return;
        }

        if topology.apply_event(&msg.body) {
            let topology = topology.clone();
            drop(state);
            self.publish(&topology, SnapshotSource::Notification);
        }
    }
}

#[async_trait]
impl EventSubscriber for SystemInner {
    async fn handle_event_message(&self, msg: EventMessage) {
        match msg.kind {
            EventKind::UpnpPropChange => self.apply_notification(&msg).await,
            EventKind::Unknown if msg.is_stop_request() => {
                log::info!("[System] Stop requested on the listener port");
                self.listener.stop();
            }
            EventKind::Unknown => {
                log::debug!("[System] Ignoring request {:?}", msg.subject);
            }
            EventKind::HandlerStatus => match msg.subject.get(1).map(String::as_str) {
                Some("STARTED") => {
                    let port = self.listener.port().unwrap_or_default();
                    log::debug!("[System] Listener started on port {}", port);
                    self.emitter.emit_listener(ListenerEvent::Started {
                        port,
                        timestamp: now_millis(),
                    });
                }
                Some("STOPPED") => {
                    log::debug!("[System] Listener stopped");
                    self.emitter.emit_listener(ListenerEvent::Stopped {
                        timestamp: now_millis(),
                    });
                }
                _ => {}
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerConfig;
    use crate::events::{BroadcastEventBridge, NoopEventEmitter, SystemEvent};
    use crate::sonos::discovery::DiscoveryResult;
    use crate::sonos::gena_client::{GenaResult, SubscribeResponse};
    use crate::sonos::soap::{SoapError, SoapResult};
    use crate::sonos::test_fixtures::{
        member_xml, member_xml_at, transport_info_response, two_player_state, zgt_notify_body,
        zone_group_state_response, zone_group_state_xml, zone_group_xml,
    };
    use crate::sonos::traits::SonosTransport;
    use crate::sonos::types::TransportState;
    use axum::http::{header, Method, StatusCode, Uri};
    use axum::response::IntoResponse;
    use axum::Router;
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const LOCATION: &str = "http://127.0.0.1:1400/xml/device_description.xml";

    #[derive(Default)]
    struct MockClient {
        state_xml: parking_lot::Mutex<Option<String>>,
        location: Option<String>,
        silent: bool,
        reject_subscribe: bool,
        fetches: AtomicUsize,
        subscribes: AtomicUsize,
        unsubscribes: AtomicUsize,
    }

    impl MockClient {
        fn serving(state: String) -> Arc<Self> {
            let client = Self::default();
            *client.state_xml.lock() = Some(state);
            Arc::new(client)
        }
    }

    #[async_trait]
    impl SonosDiscovery for MockClient {
        async fn find_device_description(&self) -> DiscoveryResult<String> {
            if self.silent {
                return Err(DiscoveryError::NoResponse(Duration::from_millis(5000)));
            }
            Ok(self.location.clone().unwrap_or_else(|| LOCATION.to_string()))
        }
    }

    #[async_trait]
    impl SonosEventing for MockClient {
        async fn subscribe(
            &self,
            _: &str,
            _: &str,
            lease_secs: u64,
        ) -> GenaResult<SubscribeResponse> {
            let n = self.subscribes.fetch_add(1, Ordering::SeqCst) + 1;
            if self.reject_subscribe {
                return Err(crate::sonos::gena_client::GenaError::SubscriptionFailed(503));
            }
            Ok(SubscribeResponse {
                sid: format!("uuid:zgt-{n}"),
                timeout_secs: lease_secs,
            })
        }

        async fn renew(&self, _: &str, _: &str, lease_secs: u64) -> GenaResult<u64> {
            Ok(lease_secs)
        }

        async fn unsubscribe(&self, _: &str, _: &str) -> bool {
            self.unsubscribes.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[async_trait]
    impl SonosTopology for MockClient {
        async fn get_zone_group_state(&self, _device: &Endpoint) -> SoapResult<String> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.state_xml
                .lock()
                .clone()
                .ok_or_else(|| SoapError::HttpStatus(500, "Internal Server Error".into()))
        }
    }

    #[async_trait]
    impl SonosTransport for MockClient {
        async fn get_transport_state(&self, _device: &Endpoint) -> SoapResult<TransportState> {
            Ok(TransportState::Stopped)
        }
    }

    struct MockSession {
        zone: ZonePtr,
        valid: AtomicBool,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ControlSession for MockSession {
        fn is_valid(&self) -> bool {
            self.valid.load(Ordering::SeqCst)
        }

        fn zone(&self) -> ZonePtr {
            self.zone.clone()
        }

        async fn close(&self) {
            self.valid.store(false, Ordering::SeqCst);
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct MockSessions {
        succeed: AtomicBool,
        closed: Arc<AtomicUsize>,
    }

    impl MockSessions {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                succeed: AtomicBool::new(true),
                closed: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    #[async_trait]
    impl SessionFactory for MockSessions {
        async fn connect(
            &self,
            zone: ZonePtr,
            _listener: Arc<EventListener>,
            _emitter: Arc<dyn EventEmitter>,
        ) -> Arc<dyn ControlSession> {
            Arc::new(MockSession {
                zone,
                valid: AtomicBool::new(self.succeed.load(Ordering::SeqCst)),
                closed: self.closed.clone(),
            })
        }
    }

    fn config(callback_timeout_ms: u64) -> SystemConfig {
        SystemConfig {
            listener: ListenerConfig {
                bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 0,
                advertise_ip: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            },
            callback_timeout_ms,
            ..SystemConfig::default()
        }
    }

    fn system_with(
        client: Arc<MockClient>,
        sessions: Arc<MockSessions>,
        emitter: Arc<dyn EventEmitter>,
        callback_timeout_ms: u64,
    ) -> SonosSystem {
        let config = config(callback_timeout_ms);
        let listener = Arc::new(EventListener::new(config.listener.clone()));
        SonosSystem::new(client, sessions, listener, emitter, config)
    }

    fn system(client: Arc<MockClient>, sessions: Arc<MockSessions>) -> SonosSystem {
        system_with(client, sessions, Arc::new(NoopEventEmitter), 100)
    }

    fn noop() -> Arc<dyn EventEmitter> {
        Arc::new(NoopEventEmitter)
    }

    #[tokio::test]
    async fn falls_back_to_manual_fetch_without_notification() {
        let client = MockClient::serving(two_player_state());
        let system = system(client.clone(), MockSessions::new());

        assert_eq!(system.discover().await.unwrap(), SnapshotSource::ManualFetch);
        assert_eq!(client.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(system.list_zones().await.len(), 1);
        assert_eq!(system.list_players().await.len(), 2);
        assert_eq!(*system.topology_updates().borrow(), 1);
        system.shutdown().await;
    }

    #[tokio::test]
    async fn notification_ends_the_wait_without_fetching() {
        let client = Arc::new(MockClient::default());
        let bridge = BroadcastEventBridge::new(16);
        let mut events = bridge.subscribe();
        let system = system_with(client.clone(), MockSessions::new(), Arc::new(bridge), 5000);

        let inject = async {
            while client.subscribes.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            system.listener().deliver(EventMessage::prop_change(
                "uuid:zgt-1",
                "0",
                "/gena/ZoneGroupTopology/Event",
                zgt_notify_body(&two_player_state()),
            ));
        };
        let (result, ()) = tokio::join!(system.discover(), inject);

        assert_eq!(result.unwrap(), SnapshotSource::Notification);
        assert_eq!(client.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(system.list_players().await.len(), 2);

        let topology = loop {
            match events.recv().await.unwrap() {
                SystemEvent::Topology(TopologyEvent::Updated { zones, source, .. }) => {
                    break (zones, source)
                }
                _ => continue,
            }
        };
        assert_eq!(topology.0.len(), 1);
        assert_eq!(topology.1, SnapshotSource::Notification);
        system.shutdown().await;
    }

    #[tokio::test]
    async fn notification_for_another_sid_is_ignored() {
        let client = MockClient::serving(two_player_state());
        let system = system(client.clone(), MockSessions::new());

        let inject = async {
            while client.subscribes.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            system.listener().deliver(EventMessage::prop_change(
                "uuid:stranger",
                "0",
                "/gena/ZoneGroupTopology/Event",
                zgt_notify_body(&two_player_state()),
            ));
        };
        let (result, ()) = tokio::join!(system.discover(), inject);
        assert_eq!(result.unwrap(), SnapshotSource::ManualFetch);
        system.shutdown().await;
    }

    #[tokio::test]
    async fn rejected_subscription_skips_the_wait() {
        let client = Arc::new(MockClient {
            reject_subscribe: true,
            ..Default::default()
        });
        *client.state_xml.lock() = Some(two_player_state());
        let system = system_with(client.clone(), MockSessions::new(), noop(), 60_000);

        let result = tokio::time::timeout(Duration::from_secs(5), system.discover())
            .await
            .expect("discover should not wait for a notification");
        assert_eq!(result.unwrap(), SnapshotSource::ManualFetch);
        system.shutdown().await;
    }

    #[tokio::test]
    async fn failed_fetch_reports_snapshot_unavailable() {
        let client = Arc::new(MockClient::default());
        let system = system(client, MockSessions::new());
        assert!(matches!(
            system.discover().await,
            Err(SystemError::SnapshotUnavailable(_))
        ));
        system.shutdown().await;
    }

    #[tokio::test]
    async fn discovery_failure_is_reported() {
        let client = Arc::new(MockClient {
            silent: true,
            ..Default::default()
        });
        let system = system(client.clone(), MockSessions::new());

        assert!(matches!(
            system.discover().await,
            Err(SystemError::Discovery(DiscoveryError::NoResponse(_)))
        ));
        assert_eq!(client.subscribes.load(Ordering::SeqCst), 0);
        assert!(!system.listener().is_running());
    }

    #[tokio::test]
    async fn malformed_location_is_reported() {
        let client = Arc::new(MockClient {
            location: Some("http://10.0.0.5/xml/device_description.xml".into()),
            ..Default::default()
        });
        let system = system(client.clone(), MockSessions::new());

        assert!(matches!(
            system.discover().await,
            Err(SystemError::MalformedEndpoint(_))
        ));
        assert_eq!(client.subscribes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rediscover_tears_down_exactly_one_subscription() {
        let client = MockClient::serving(two_player_state());
        let system = system(client.clone(), MockSessions::new());

        system.discover().await.unwrap();
        system.discover().await.unwrap();

        assert_eq!(client.subscribes.load(Ordering::SeqCst), 2);
        assert_eq!(client.unsubscribes.load(Ordering::SeqCst), 1);
        system.shutdown().await;
        assert_eq!(client.unsubscribes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn list_zones_hides_zones_without_coordinator() {
        let state = zone_group_state_xml(&[
            zone_group_xml(
                "RINCON_A:1",
                "RINCON_A",
                &[member_xml("RINCON_A", "10.0.0.5", "Living Room")],
            ),
            zone_group_xml(
                "RINCON_Q:2",
                "RINCON_GONE",
                &[member_xml("RINCON_Q", "10.0.0.9", "Porch")],
            ),
        ]);
        let client = MockClient::serving(state);
        let system = system(client, MockSessions::new());
        system.discover().await.unwrap();

        let zones = system.list_zones().await;
        assert_eq!(zones.len(), 1);
        assert!(zones.values().all(|z| z.coordinator().is_some()));
        assert_eq!(system.list_players().await.len(), 2);

        let porch = system.list_players().await["RINCON_Q"].clone();
        assert!(matches!(
            system.connect_zone_player(&porch, noop()).await,
            Err(SystemError::EmptyZone(id)) if id == "RINCON_Q:2"
        ));
        assert!(!system.is_connected().await);
        system.shutdown().await;
    }

    #[tokio::test]
    async fn connect_before_discovery_is_rejected() {
        let system = system(Arc::new(MockClient::default()), MockSessions::new());
        let player = ZonePlayer::new("RINCON_A", "Living Room", LOCATION, "RINCON_A:1", true);
        assert!(matches!(
            system.connect_zone_player(&player, noop()).await,
            Err(SystemError::NotDiscovered)
        ));
    }

    #[tokio::test]
    async fn connect_by_player_uses_its_zone() {
        let client = MockClient::serving(two_player_state());
        let system = system(client, MockSessions::new());
        system.discover().await.unwrap();

        let kitchen = system.list_players().await["RINCON_B"].clone();
        system.connect_zone_player(&kitchen, noop()).await.unwrap();

        let connected = system.connected_zone().await.unwrap();
        assert_eq!(connected.zone.id(), "RINCON_A:1");
        assert_eq!(connected.player.zone().id(), "RINCON_A:1");
        system.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_group_leaves_connection_untouched() {
        let client = MockClient::serving(two_player_state());
        let sessions = MockSessions::new();
        let system = system(client, sessions.clone());
        system.discover().await.unwrap();

        let zone = system.list_zones().await["RINCON_A:1"].clone();
        system.connect_zone(zone, noop()).await.unwrap();

        let stranger = ZonePlayer::new("RINCON_X", "Garage", LOCATION, "RINCON_X:9", true);
        assert!(matches!(
            system.connect_zone_player(&stranger, noop()).await,
            Err(SystemError::UnknownGroup(group)) if group == "RINCON_X:9"
        ));
        assert_eq!(
            system.connected_zone().await.unwrap().zone.id(),
            "RINCON_A:1"
        );
        assert_eq!(sessions.closed.load(Ordering::SeqCst), 0);
        system.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_session_does_not_replace_connection() {
        let client = MockClient::serving(two_player_state());
        let sessions = MockSessions::new();
        let system = system(client, sessions.clone());
        system.discover().await.unwrap();
        let zone = system.list_zones().await["RINCON_A:1"].clone();

        sessions.succeed.store(false, Ordering::SeqCst);
        assert!(matches!(
            system.connect_zone(zone.clone(), noop()).await,
            Err(SystemError::InvalidSession(_))
        ));
        assert!(!system.is_connected().await);

        sessions.succeed.store(true, Ordering::SeqCst);
        system.connect_zone(zone.clone(), noop()).await.unwrap();
        let before = system.connected_zone().await.unwrap();

        sessions.succeed.store(false, Ordering::SeqCst);
        assert!(system.connect_zone(zone, noop()).await.is_err());
        let after = system.connected_zone().await.unwrap();
        assert!(Arc::ptr_eq(&before.player, &after.player));
        assert!(after.player.is_valid());
        system.shutdown().await;
    }

    #[tokio::test]
    async fn reconnecting_closes_the_previous_session() {
        let client = MockClient::serving(two_player_state());
        let sessions = MockSessions::new();
        let system = system(client, sessions.clone());
        system.discover().await.unwrap();
        let zone = system.list_zones().await["RINCON_A:1"].clone();

        system.connect_zone(zone.clone(), noop()).await.unwrap();
        system.connect_zone(zone, noop()).await.unwrap();
        assert_eq!(sessions.closed.load(Ordering::SeqCst), 1);

        system.shutdown().await;
        assert_eq!(sessions.closed.load(Ordering::SeqCst), 2);
        assert!(!system.is_connected().await);
        assert!(!system.listener().is_running());
    }

    #[tokio::test]
    async fn is_connected_has_no_side_effects() {
        let client = MockClient::serving(two_player_state());
        let system = system(client, MockSessions::new());
        assert!(!system.is_connected().await);
        assert!(!system.is_connected().await);

        system.discover().await.unwrap();
        let zone = system.list_zones().await["RINCON_A:1"].clone();
        system.connect_zone(zone, noop()).await.unwrap();
        assert!(system.is_connected().await);
        assert!(system.is_connected().await);
        system.shutdown().await;
    }

    #[tokio::test]
    async fn stop_request_stops_the_listener() {
        let client = MockClient::serving(two_player_state());
        let system = system(client, MockSessions::new());
        system.discover().await.unwrap();
        assert!(system.listener().is_running());

        system
            .listener()
            .deliver(EventMessage::unknown("GET", "/stop"));
        for _ in 0..100 {
            if !system.listener().is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!system.listener().is_running());
        system.shutdown().await;
    }

    #[tokio::test]
    async fn dropping_without_shutdown_releases_subscription_and_listener() {
        let client = MockClient::serving(two_player_state());
        let sessions = MockSessions::new();
        let system = system(client.clone(), sessions.clone());
        system.discover().await.unwrap();
        let zone = system.list_zones().await["RINCON_A:1"].clone();
        system.connect_zone(zone, noop()).await.unwrap();
        let listener = system.listener().clone();
        assert!(listener.is_running());

        drop(system);
        for _ in 0..100 {
            if !listener.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(client.unsubscribes.load(Ordering::SeqCst), 1);
        assert_eq!(sessions.closed.load(Ordering::SeqCst), 1);
        assert_eq!(listener.subscriber_count(), 0);
        assert!(!listener.is_running());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Networked wiring
    // ─────────────────────────────────────────────────────────────────────────

    /// Loopback zone player that answers SOAP and refuses GENA subscriptions.
    ///
    /// `household` receives the stub's address so members can point back at it.
    async fn spawn_zone_player(household: impl FnOnce(SocketAddr) -> String) -> SocketAddr {
        let tcp = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .unwrap();
        let addr = tcp.local_addr().unwrap();
        let topology = zone_group_state_response(&household(addr));

        let app = Router::new().fallback(move |method: Method, uri: Uri| {
            let topology = topology.clone();
            async move {
                let xml = [(header::CONTENT_TYPE, "text/xml; charset=\"utf-8\"")];
                match (method.as_str(), uri.path()) {
                    ("POST", "/ZoneGroupTopology/Control") => (xml, topology).into_response(),
                    ("POST", "/MediaRenderer/AVTransport/Control") => {
                        (xml, transport_info_response("STOPPED")).into_response()
                    }
                    _ => StatusCode::SERVICE_UNAVAILABLE.into_response(),
                }
            }
        });
        tokio::spawn(async move {
            axum::serve(tcp, app).await.unwrap();
        });
        addr
    }

    fn device_endpoint(addr: SocketAddr) -> Endpoint {
        format!("http://{addr}/xml/device_description.xml")
            .parse()
            .unwrap()
    }

    #[tokio::test]
    async fn networked_system_pulls_topology_when_subscribe_is_refused() {
        let device = spawn_zone_player(|addr| {
            zone_group_state_xml(&[zone_group_xml(
                "RINCON_A:1",
                "RINCON_A",
                &[member_xml_at("RINCON_A", &addr.to_string(), "Living Room")],
            )])
        })
        .await;
        let system = SonosSystem::with_config(SystemConfig {
            soap_timeout_secs: 2,
            ..config(10_000)
        })
        .unwrap();

        let started = tokio::time::Instant::now();
        let source = system.establish(device_endpoint(device)).await.unwrap();
        assert_eq!(source, SnapshotSource::ManualFetch);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(system.list_players().await.len(), 1);

        let zone = system.list_zones().await["RINCON_A:1"].clone();
        system.connect_zone(zone, noop()).await.unwrap();
        let connected = system.connected_zone().await.unwrap();
        assert!(connected.player.is_valid());

        system.shutdown().await;
        assert!(!system.is_connected().await);
        assert!(!system.listener().is_running());
    }

    #[tokio::test]
    async fn unresponsive_device_cannot_stall_the_system() {
        let silent = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .unwrap();
        let addr = silent.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = silent.accept().await {
                held.push(stream);
            }
        });
        let system = SonosSystem::with_config(SystemConfig {
            soap_timeout_secs: 1,
            ..config(1000)
        })
        .unwrap();

        let query = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            tokio::time::timeout(Duration::from_secs(3), system.is_connected()).await
        };
        let (result, connected) = tokio::join!(
            tokio::time::timeout(
                Duration::from_secs(20),
                system.establish(device_endpoint(addr))
            ),
            query
        );

        assert!(matches!(
            result.expect("establish should give up on a silent device"),
            Err(SystemError::SnapshotUnavailable(_))
        ));
        assert_eq!(connected.ok(), Some(false));
        system.shutdown().await;
    }
}
