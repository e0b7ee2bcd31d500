//! Event emitter abstraction for decoupling the system from its observers.
//!
//! The system and control sessions depend on the [`EventEmitter`] trait
//! rather than on a concrete channel, so observers can be swapped in tests
//! and embedders.

use super::{ListenerEvent, TopologyEvent, ZoneEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// # Example
///
/// ```ignore
/// struct Watcher {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl Watcher {
///     fn connected(&self, zone: &Zone) {
///         self.emitter.emit_zone(ZoneEvent::Connected { ... });
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a topology update.
    fn emit_topology(&self, event: TopologyEvent);

    /// Emits a connected-zone event.
    fn emit_zone(&self, event: ZoneEvent);

    fn emit_listener(&self, event: ListenerEvent);
}

/// Discards every event.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_topology(&self, _event: TopologyEvent) {}

    fn emit_zone(&self, _event: ZoneEvent) {}

    fn emit_listener(&self, _event: ListenerEvent) {}
}

/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_topology(&self, event: TopologyEvent) {
        tracing::debug!(?event, "topology_event");
    }

    fn emit_zone(&self, event: ZoneEvent) {
        tracing::debug!(?event, "zone_event");
    }

    fn emit_listener(&self, event: ListenerEvent) {
        tracing::debug!(?event, "listener_event");
    }
}
