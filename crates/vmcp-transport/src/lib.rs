//! HTTP and SSE client transports to upstream MCP servers (spec §4.1).

pub mod config;
pub mod error;
pub mod http;
pub mod sse;

pub use config::{HttpTransportConfig, SseTransportConfig};
pub use error::TransportError;
pub use http::HttpUpstreamTransport;
pub use sse::SseUpstreamTransport;
