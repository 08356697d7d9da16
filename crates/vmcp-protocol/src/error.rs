//! Maps the shared [`vmcp_core::VmcpError`] taxonomy onto JSON-RPC error
//! codes (spec §7 table).

use serde_json::json;
use vmcp_core::{ErrorKind, VmcpError};

use crate::jsonrpc::JsonRpcError;

/// Standard JSON-RPC codes named in spec §7.
pub const INVALID_PARAMS: i64 = -32602;
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Everything else in the §7 taxonomy that isn't one of the two codes the
/// spec calls out explicitly is surfaced as a server-defined error in the
/// `-32000..-32099` reserved range, distinguished by `data.kind`.
pub const SERVER_ERROR: i64 = -32000;

/// Build a structured JSON-RPC error from a `VmcpError`, scrubbing any of
/// the vMCP's secret env values from the message and any string fields in
/// `data` first (spec §7 "Secrets are stripped from all error details").
pub fn to_jsonrpc_error(err: &VmcpError, secret_values: &[String]) -> JsonRpcError {
    let kind = err.kind();
    let code = match kind {
        ErrorKind::BadArguments => INVALID_PARAMS,
        ErrorKind::UnknownTool | ErrorKind::UnknownResource | ErrorKind::UnknownPrompt => {
            METHOD_NOT_FOUND
        }
        _ => SERVER_ERROR,
    };

    let message = vmcp_core::error::redact_secrets(&err.to_string(), secret_values);

    let mut data = json!({ "kind": format!("{:?}", kind) });
    if let VmcpError::UpstreamUnavailable { server }
    | VmcpError::UpstreamTimeout { server }
    | VmcpError::UpstreamProtocol { server, .. }
    | VmcpError::UpstreamToolError { server, .. }
    | VmcpError::UpstreamSaturated { server } = err
    {
        data["server"] = json!(vmcp_core::error::redact_secrets(server, secret_values));
    }
    if let VmcpError::AuthRequired {
        server,
        authorization_url,
    } = err
    {
        data["server"] = json!(server);
        if let Some(url) = authorization_url {
            data["authorization_url"] = json!(url);
        }
    }
    data["detail"] = json!(message);

    JsonRpcError {
        code,
        message,
        data: Some(data),
    }
}
