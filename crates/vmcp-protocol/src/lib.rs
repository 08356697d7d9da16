//! MCP wire types and JSON-RPC envelope, independent of transport.

pub mod error;
pub mod jsonrpc;
pub mod types;

pub use error::to_jsonrpc_error;
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, JsonRpcResponsePayload, RequestId};
