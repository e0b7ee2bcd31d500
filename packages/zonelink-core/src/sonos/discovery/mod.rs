//! Zone player discovery over SSDP.
//!
//! - `header` - header line token scanning
//! - `matcher` - per-response match context
//! - `line_reader` - line-oriented socket abstraction
//! - `endpoint` - parsed device description location
//! - `ssdp` - the search loop

pub mod endpoint;
pub mod header;
pub mod line_reader;
pub mod matcher;
pub mod ssdp;
pub mod types;

pub use endpoint::{Endpoint, EndpointError};
pub use header::{scan_header, HeaderToken};
pub use line_reader::{LineReader, SearchSocket, UdpLineReader};
pub use matcher::{MatchContext, Requirements, ResponseMatcher};
pub use ssdp::{search, SsdpDiscovery};
pub use types::{DiscoveryError, DiscoveryResult};
