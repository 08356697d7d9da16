//! End-to-end HTTP-layer coverage for the Protocol Adapter (spec §8): the
//! health check, vMCP-not-found routing, and the `initialize`/`ping`/
//! `tools/list` round trip against a vMCP with no upstreams or custom
//! tools, exercised through the router directly with `tower::ServiceExt`
//! rather than a bound socket.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use vmcp_composer::{Composer, Vmcp};
use vmcp_core::blob::InMemoryBlobStore;
use vmcp_core::usage::InMemoryUsageLog;
use vmcp_core::VmcpId;
use vmcp_server::{AdminApi, AppState, VmcpServerConfig, VmcpStore};
use vmcp_tools::{HttpEngine, ScriptEngine};
use vmcp_upstream::UpstreamRegistry;

fn demo_vmcp(name: &str) -> Vmcp {
    Vmcp {
        id: VmcpId::new(name),
        name: name.to_string(),
        description: None,
        upstream_refs: Vec::new(),
        custom_tools: Vec::new(),
        custom_resources: Vec::new(),
        custom_prompts: Vec::new(),
        system_prompt: String::new(),
        env: HashMap::new(),
    }
}

fn test_state(seed: &[&str]) -> AppState {
    let registry = Arc::new(UpstreamRegistry::new());
    let composer = Arc::new(Composer::new(
        registry.clone(),
        ScriptEngine::new(4),
        HttpEngine::default(),
        Arc::new(InMemoryBlobStore::default()),
        Arc::new(InMemoryUsageLog::default()),
    ));
    let store = Arc::new(VmcpStore::new());
    for name in seed {
        store.insert(demo_vmcp(name));
    }
    let admin = Arc::new(AdminApi::new(registry, store.clone()));
    AppState::new(composer, store, admin, Arc::new(VmcpServerConfig::default()))
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn jsonrpc_request(vmcp_name: &str, method: &str, params: serde_json::Value) -> Request<Body> {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });
    Request::builder()
        .method("POST")
        .uri(format!("/private/{vmcp_name}/vmcp"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn healthz_reports_the_crate_version() {
    let router = vmcp_server::router(test_state(&[]));
    let response = router
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn unknown_vmcp_name_returns_not_found() {
    let router = vmcp_server::router(test_state(&[]));
    let response = router
        .oneshot(jsonrpc_request("missing", "ping", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], vmcp_protocol::error::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn initialize_then_ping_then_empty_tools_list() {
    let router = vmcp_server::router(test_state(&["demo"]));

    let init = router
        .clone()
        .oneshot(jsonrpc_request("demo", "initialize", serde_json::json!({ "protocolVersion": "2024-11-05" })))
        .await
        .unwrap();
    assert_eq!(init.status(), StatusCode::OK);
    let init_body = json_body(init).await;
    assert_eq!(init_body["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(init_body["result"]["serverInfo"]["name"], "demo");

    let ping = router
        .clone()
        .oneshot(jsonrpc_request("demo", "ping", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(ping.status(), StatusCode::OK);
    let ping_body = json_body(ping).await;
    assert!(ping_body.get("error").is_none());

    let tools = router
        .oneshot(jsonrpc_request("demo", "tools/list", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(tools.status(), StatusCode::OK);
    let tools_body = json_body(tools).await;
    assert_eq!(tools_body["result"]["tools"], serde_json::json!([]));
}

#[tokio::test]
async fn unknown_method_surfaces_as_method_not_found() {
    let router = vmcp_server::router(test_state(&["demo"]));
    let response = router
        .oneshot(jsonrpc_request("demo", "not/a/real/method", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], vmcp_protocol::error::METHOD_NOT_FOUND);
}
