//! axum HTTP entrypoint (spec §4.7, §6): vMCP-by-path JSON-RPC-over-HTTP,
//! grounded on `turbomcp-transport`'s `json_rpc_handler`/router-builder
//! shape but retargeted from "one backend" to "one vMCP looked up by
//! path segment".

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};
use vmcp_composer::{build_context, EnvOverrides};
use vmcp_protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};

use crate::protocol;
use crate::sse::sse_handler;
use crate::state::AppState;

/// Well-known header carrying per-request environment overrides (spec
/// §4.6 "Environment binding... from a well-known header") as a flat JSON
/// object of string values.
pub const ENV_OVERRIDES_HEADER: &str = "x-vmcp-env-overrides";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/private/{vmcp_name}/vmcp", post(json_rpc_handler))
        .route("/private/{vmcp_name}/vmcp/sse", get(sse_handler))
        .route("/healthz", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(120)))
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn env_overrides_from_headers(headers: &HeaderMap) -> EnvOverrides {
    headers
        .get(ENV_OVERRIDES_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| serde_json::from_str::<EnvOverrides>(raw).ok())
        .unwrap_or_default()
}

fn not_found(id: RequestId, vmcp_name: &str) -> JsonRpcResponse {
    JsonRpcResponse::error(
        id,
        JsonRpcError {
            code: vmcp_protocol::error::METHOD_NOT_FOUND,
            message: format!("no such vMCP: {vmcp_name}"),
            data: None,
        },
    )
}

/// Terminates JSON-RPC over HTTP for one vMCP (spec §6 "JSON-RPC-over-HTTP
/// form"). Guarantees exactly one response envelope per inbound request
/// (spec §7), even when the looked-up vMCP doesn't exist or the request is
/// malformed.
async fn json_rpc_handler(
    State(state): State<AppState>,
    Path(vmcp_name): Path<String>,
    headers: HeaderMap,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    debug!(vmcp = %vmcp_name, method = %request.method, "inbound JSON-RPC request");

    let Some(record) = state.store.get_by_name(&vmcp_name) else {
        return (StatusCode::NOT_FOUND, Json(not_found(request.id, &vmcp_name)));
    };

    let overrides = env_overrides_from_headers(&headers);
    let ctx = build_context(
        &record.vmcp,
        &overrides,
        state.config.default_request_deadline,
        state.config.template_max_depth,
    );

    let response = match protocol::dispatch(&state.composer, &record, &request.method, request.params.clone().unwrap_or_default(), &ctx).await {
        Ok(result) => JsonRpcResponse::success(request.id.clone(), result),
        Err(err) => {
            warn!(vmcp = %vmcp_name, method = %request.method, error = %err, "request failed");
            let rpc_error = vmcp_protocol::to_jsonrpc_error(&err, &ctx.env.secret_values());
            JsonRpcResponse::error(request.id.clone(), rpc_error)
        }
    };

    if let Ok(serialized) = serde_json::to_string(&response) {
        state.broadcast(&record.vmcp.id, serialized);
    } else {
        error!(vmcp = %vmcp_name, "failed to serialize JSON-RPC response for SSE broadcast");
    }

    (StatusCode::OK, Json(response))
}
