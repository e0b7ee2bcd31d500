//! Per-response matching for SSDP search replies.
//!
//! A reply is accepted only when one uninterrupted header block shows all
//! four [`Requirements`]: a `200` status line, an `ST` equal to the search
//! target, a `SERVER` header, and a `LOCATION` header. Anything unexpected
//! drops the candidate by returning the context to [`MatchContext::Idle`].

use std::fmt;

use super::header::scan_header;
use crate::protocol_constants::HTTP_STATUS_LINE_LEN;

// ─────────────────────────────────────────────────────────────────────────────
// Requirements
// ─────────────────────────────────────────────────────────────────────────────

/// Set of facts observed for the candidate response.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Requirements(u8);

impl Requirements {
    /// Status line carried code 200.
    pub const STATUS_OK: Self = Self(0x1);
    /// `ST` header equals the expected search target.
    pub const SEARCH_TARGET: Self = Self(0x2);
    /// A `SERVER` header was present.
    pub const SERVER: Self = Self(0x4);
    /// A `LOCATION` header was present.
    pub const LOCATION: Self = Self(0x8);

    const ALL: Self = Self(0xF);

    /// The empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Adds `other` to the set.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// True when every bit of `other` is in the set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True once all four facts have been observed.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        self.contains(Self::ALL)
    }
}

impl fmt::Debug for Requirements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for (flag, name) in [
            (Self::STATUS_OK, "STATUS_OK"),
            (Self::SEARCH_TARGET, "SEARCH_TARGET"),
            (Self::SERVER, "SERVER"),
            (Self::LOCATION, "LOCATION"),
        ] {
            if self.contains(flag) {
                set.entry(&name);
            }
        }
        set.finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Match Context
// ─────────────────────────────────────────────────────────────────────────────

/// State of the candidate response currently being read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MatchContext {
    /// No candidate; header lines are ignored until a `200` status line.
    #[default]
    Idle,
    /// A `200` status line was seen and headers are being collected.
    Open {
        satisfied: Requirements,
        location: Option<String>,
    },
}

/// Feeds response lines through the match rules for one search target.
#[derive(Debug, Clone)]
pub struct ResponseMatcher {
    search_target: String,
    context: MatchContext,
}

impl ResponseMatcher {
    /// Creates a matcher in the idle state.
    pub fn new(search_target: impl Into<String>) -> Self {
        Self {
            search_target: search_target.into(),
            context: MatchContext::Idle,
        }
    }

    /// Current context, mostly useful in tests and trace logs.
    #[must_use]
    pub fn context(&self) -> &MatchContext {
        &self.context
    }

    /// Drops any partially matched candidate.
    pub fn reset(&mut self) {
        self.context = MatchContext::Idle;
    }

    /// Processes one line (without its CRLF terminator).
    ///
    /// Returns the captured location once the candidate satisfies every
    /// requirement; the matcher is idle again afterwards.
    pub fn feed(&mut self, line: &str) -> Option<String> {
        if is_status_line(line) {
            self.context = match status_code(line) {
                Some(200) => MatchContext::Open {
                    satisfied: Requirements::STATUS_OK,
                    location: None,
                },
                other => {
                    log::trace!("[Discovery] Discarding response with status {:?}", other);
                    MatchContext::Idle
                }
            };
            return None;
        }

        let MatchContext::Open {
            satisfied,
            location,
        } = &mut self.context
        else {
            return None;
        };

        if line.is_empty() {
            log::trace!("[Discovery] Header block ended with {:?}", satisfied);
            self.context = MatchContext::Idle;
            return None;
        }

        let Some(header) = scan_header(line) else {
            return None;
        };

        // Length first, content second.
        match header.token().len() {
            2 if header.token() == "ST" => {
                if header.value() != self.search_target {
                    log::trace!("[Discovery] Ignoring responder for {}", header.value());
                    self.context = MatchContext::Idle;
                    return None;
                }
                satisfied.insert(Requirements::SEARCH_TARGET);
            }
            6 if header.token() == "SERVER" => satisfied.insert(Requirements::SERVER),
            8 if header.token() == "LOCATION" => {
                satisfied.insert(Requirements::LOCATION);
                *location = Some(header.value().to_string());
            }
            _ => {}
        }

        if satisfied.is_complete() {
            let found = location.take();
            self.context = MatchContext::Idle;
            return found;
        }
        None
    }
}

fn is_status_line(line: &str) -> bool {
    line.len() == HTTP_STATUS_LINE_LEN && line.starts_with("HTTP")
}

fn status_code(line: &str) -> Option<u16> {
    line.split_whitespace().nth(1)?.parse().ok()
}
