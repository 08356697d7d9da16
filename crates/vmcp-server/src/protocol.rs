//! Translates inbound MCP methods (spec §6) into Composer calls, and
//! Composer results/errors back into MCP success or error envelopes per
//! spec §7. One function per method, `dispatch` fans out on the method
//! name the way `turbomcp-proxy`'s `ProxyService::process_jsonrpc` does.

use serde_json::{json, Value};
use vmcp_composer::Composer;
use vmcp_core::{InvocationContext, VmcpError};
use vmcp_protocol::types::{
    Arguments, GetPromptResult, InitializeResult, ReadResourceResult, ServerCapabilities,
    ServerInfo,
};
use vmcp_protocol::RequestId;

use crate::store::VmcpRecord;

/// Protocol version this Adapter negotiates (SPEC_FULL §2 "initialize
/// handshake details"). Accepted unconditionally: the Composer has no
/// version-specific behavior to gate on, so any client-proposed version is
/// echoed back rather than rejected.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

fn bad_params(method: &str) -> VmcpError {
    VmcpError::BadArguments(format!("missing or malformed params for {method}"))
}

fn arguments_of(params: &Value, field: &str) -> Result<Arguments, VmcpError> {
    match params.get(field) {
        Some(Value::Object(map)) => Ok(map.clone().into_iter().collect()),
        None => Ok(Arguments::new()),
        Some(_) => Err(VmcpError::BadArguments(format!("{field} must be an object"))),
    }
}

fn string_field(params: &Value, field: &str, method: &str) -> Result<String, VmcpError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| bad_params(method))
}

pub fn initialize(record: &VmcpRecord, requested_protocol_version: Option<&str>) -> InitializeResult {
    InitializeResult {
        protocol_version: requested_protocol_version.unwrap_or(PROTOCOL_VERSION).to_string(),
        capabilities: ServerCapabilities {
            tools: true,
            resources: true,
            prompts: true,
        },
        server_info: ServerInfo {
            name: record.vmcp.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    }
}

/// Dispatches one already-parsed JSON-RPC method to the Composer, returning
/// the MCP result value on success. `ping` and `initialize` are handled
/// locally (SPEC_FULL §2: `ping` never round-trips the Composer).
pub async fn dispatch(
    composer: &Composer,
    record: &VmcpRecord,
    method: &str,
    params: Value,
    ctx: &InvocationContext,
) -> Result<Value, VmcpError> {
    match method {
        "initialize" => {
            let requested = params.get("protocolVersion").and_then(Value::as_str);
            Ok(serde_json::to_value(initialize(record, requested)).expect("InitializeResult always serializes"))
        }
        "ping" => Ok(json!({})),
        "tools/list" => {
            let tools = composer.list_tools(&record.vmcp, ctx).await?;
            Ok(json!({ "tools": tools }))
        }
        "tools/call" => {
            let name = string_field(&params, "name", method)?;
            let args = params.get("arguments").cloned().unwrap_or(Value::Object(Default::default()));
            let result = composer.call_tool(&record.vmcp, &name, args, ctx).await?;
            Ok(serde_json::to_value(result).expect("CallToolResult always serializes"))
        }
        "resources/list" => {
            let resources = composer.list_resources(&record.vmcp, ctx).await?;
            Ok(json!({ "resources": resources }))
        }
        "resources/templates/list" => {
            let templates = composer.list_resource_templates(&record.vmcp, ctx).await?;
            Ok(json!({ "resourceTemplates": templates }))
        }
        "resources/read" => {
            let uri = string_field(&params, "uri", method)?;
            let result: ReadResourceResult = composer.read_resource(&record.vmcp, &uri, ctx).await?;
            Ok(json!({ "contents": result.content, "uri": result.uri, "mimeType": result.mime_type }))
        }
        "prompts/list" => {
            let prompts = composer.list_prompts(&record.vmcp, ctx).await?;
            Ok(json!({ "prompts": prompts }))
        }
        "prompts/get" => {
            let name = string_field(&params, "name", method)?;
            let args = Value::Object(arguments_of(&params, "arguments")?.into_iter().collect());
            let result: GetPromptResult = composer.get_prompt(&record.vmcp, &name, args, ctx).await?;
            Ok(serde_json::to_value(result).expect("GetPromptResult always serializes"))
        }
        other => Err(VmcpError::UnknownTool(format!("method not found: {other}"))),
    }
}

/// `id` is `None` for JSON-RPC notifications (no response expected); the
/// HTTP handler still needs a placeholder to thread through `dispatch`'s
/// signature-compatible call sites, so callers pass an explicit id.
pub fn is_notification(id: &Option<RequestId>) -> bool {
    id.is_none()
}
