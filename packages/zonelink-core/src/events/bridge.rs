//! Bridge from domain events to a broadcast channel.
//!
//! [`BroadcastEventBridge`] implements [`EventEmitter`] by wrapping each event
//! in a [`SystemEvent`] and sending it to every channel receiver, so several
//! observers can follow one system.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{ListenerEvent, SystemEvent, TopologyEvent, ZoneEvent};

/// Fans domain events out over a `tokio::sync::broadcast` channel.
///
/// An optional external emitter, settable after construction, receives
/// every event as well.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<SystemEvent>,
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self::with_sender(tx)
    }

    pub fn with_sender(tx: broadcast::Sender<SystemEvent>) -> Self {
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    /// Returns a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.tx.subscribe()
    }
}

/// Generates an [`EventEmitter`] method that forwards to the external emitter
/// (if set) and then sends to the broadcast channel.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method(event.clone());
            }
            if let Err(e) = self.tx.send(SystemEvent::$variant(event)) {
                log::trace!("[EventBridge] No broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_topology, TopologyEvent, Topology);
    impl_emit!(emit_zone, ZoneEvent, Zone);
    impl_emit!(emit_listener, ListenerEvent, Listener);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl EventEmitter for Counter {
        fn emit_topology(&self, _event: TopologyEvent) {}
        fn emit_zone(&self, _event: ZoneEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn emit_listener(&self, _event: ListenerEvent) {}
    }

    #[tokio::test]
    async fn events_reach_receivers_and_external_emitter() {
        let bridge = BroadcastEventBridge::new(8);
        let mut rx = bridge.subscribe();
        let counter = Arc::new(Counter::default());
        bridge.set_external_emitter(counter.clone());

        bridge.emit_zone(ZoneEvent::Disconnected {
            zone_id: "RINCON_A:1".into(),
            timestamp: 7,
        });

        match rx.recv().await.unwrap() {
            SystemEvent::Zone(ZoneEvent::Disconnected { zone_id, timestamp }) => {
                assert_eq!(zone_id, "RINCON_A:1");
                assert_eq!(timestamp, 7);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sending_without_receivers_is_harmless() {
        let bridge = BroadcastEventBridge::new(1);
        bridge.set_external_emitter(Arc::new(NoopEventEmitter));
        bridge.emit_listener(ListenerEvent::Stopped { timestamp: 0 });
    }

    #[test]
    fn events_serialize_with_category_tags() {
        let event = SystemEvent::from(ListenerEvent::Started {
            port: 1400,
            timestamp: 1,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "listener");
        assert_eq!(json["type"], "started");
        assert_eq!(json["port"], 1400);
    }
}
