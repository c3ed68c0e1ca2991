//! Proxy server: listener lifecycle, forwarding, and per-request dispatch.
//!
//! # Module Structure
//!
//! - `server` - ProxyServer struct, accept loop, start/stop handle
//! - `handler` - per-request dispatch (admin interception, cache decision, forward)
//! - `forward` - upstream forwarding and error mapping
//! - `client` - shared HTTP client configuration
//! - `response_ext` - response body conversions

mod client;
mod forward;
mod handler;
mod response_ext;
mod server;

pub use forward::UpstreamError;
pub use server::{ProxyHandle, ProxyServer};
