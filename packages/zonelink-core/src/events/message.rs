//! Messages delivered by the event listener to its subscribers.

use std::fmt;

/// Category of an [`EventMessage`]; subscribers opt in per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Listener lifecycle (`STATUS STARTED` / `STATUS STOPPED`).
    HandlerStatus,
    /// A validated GENA property-change NOTIFY.
    UpnpPropChange,
    /// Any other request that reached the listener.
    Unknown,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HandlerStatus => write!(f, "handler-status"),
            Self::UpnpPropChange => write!(f, "upnp-propchange"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// One message from the listener.
///
/// The subject is a short list of strings whose layout depends on the kind:
/// - `HandlerStatus`: `["STATUS", "STARTED" | "STOPPED"]`
/// - `UpnpPropChange`: `["PROPCHANGE", sid, seq, path]`
/// - `Unknown`: `[method, path]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
    pub kind: EventKind,
    pub subject: Vec<String>,
    pub body: String,
}

impl EventMessage {
    pub fn status(started: bool) -> Self {
        Self {
            kind: EventKind::HandlerStatus,
            subject: vec![
                "STATUS".to_string(),
                if started { "STARTED" } else { "STOPPED" }.to_string(),
            ],
            body: String::new(),
        }
    }

    pub fn prop_change(sid: &str, seq: &str, path: &str, body: String) -> Self {
        Self {
            kind: EventKind::UpnpPropChange,
            subject: vec![
                "PROPCHANGE".to_string(),
                sid.to_string(),
                seq.to_string(),
                path.to_string(),
            ],
            body,
        }
    }

    pub fn unknown(method: &str, path: &str) -> Self {
        Self {
            kind: EventKind::Unknown,
            subject: vec![method.to_string(), path.to_string()],
            body: String::new(),
        }
    }

    /// SID of a property-change message.
    #[must_use]
    pub fn sid(&self) -> Option<&str> {
        match (self.kind, self.subject.as_slice()) {
            (EventKind::UpnpPropChange, [tag, sid, ..]) if tag == "PROPCHANGE" => {
                Some(sid.as_str())
            }
            _ => None,
        }
    }

    /// Whether this is the `GET /stop` control request.
    #[must_use]
    pub fn is_stop_request(&self) -> bool {
        self.kind == EventKind::Unknown
            && matches!(self.subject.as_slice(), [method, path]
                if method == "GET" && path == crate::protocol_constants::LISTENER_STOP_PATH)
    }
}
