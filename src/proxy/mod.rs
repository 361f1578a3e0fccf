//! Proxy module
//!
//! Outbound side of the gateway: the upstream HTTP client, header building
//! and per-request logging.

pub mod headers;
pub mod logging;
pub mod upstream;

pub use logging::RequestContext;
pub use upstream::{ByteStream, UpstreamClient, UpstreamError, UpstreamRequest};
