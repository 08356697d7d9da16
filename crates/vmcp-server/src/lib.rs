//! MCP Protocol Adapter (spec §4.7): the axum HTTP surface that terminates
//! JSON-RPC-over-HTTP and SSE for every vMCP, backed by the Composer and a
//! language-level admin API for the control-plane operations spec §6
//! expects an external REST layer to wrap.

pub mod admin;
pub mod config;
pub mod http;
pub mod protocol;
pub mod sse;
pub mod state;
pub mod store;

pub use admin::AdminApi;
pub use config::VmcpServerConfig;
pub use http::router;
pub use state::AppState;
pub use store::{VmcpRecord, VmcpStore};
