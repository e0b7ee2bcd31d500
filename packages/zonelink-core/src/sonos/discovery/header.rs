//! Header line scanning for SSDP responses.
//!
//! Splits one `NAME: value` line into an uppercased, length-bounded token and
//! its value. The token is only ever used for comparison, so truncating it is
//! harmless and keeps hostile responders from forcing large allocations.

use crate::protocol_constants::HTTP_TOKEN_MAX_LEN;

/// One scanned header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderToken<'a> {
    token: String,
    value: &'a str,
}

impl<'a> HeaderToken<'a> {
    /// Uppercased header name, at most [`HTTP_TOKEN_MAX_LEN`] bytes.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Header value with leading spaces removed, otherwise verbatim.
    #[must_use]
    pub fn value(&self) -> &'a str {
        self.value
    }
}

/// Scans a header line into token and value.
///
/// Returns `None` when the line has no colon. Never panics, whatever the
/// input length or encoding.
#[must_use]
pub fn scan_header(line: &str) -> Option<HeaderToken<'_>> {
    let (name, value) = line.split_once(':')?;
    Some(HeaderToken {
        token: bounded_uppercase(name),
        value: value.trim_start_matches(' '),
    })
}

/// Uppercases ASCII letters and cuts the result at the last char boundary
/// that fits in [`HTTP_TOKEN_MAX_LEN`] bytes.
fn bounded_uppercase(name: &str) -> String {
    let mut end = name.len().min(HTTP_TOKEN_MAX_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_ascii_uppercase()
}
