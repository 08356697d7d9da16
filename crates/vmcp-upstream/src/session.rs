//! The Upstream Session: one logical channel to one upstream MCP server
//! (spec §4.1).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use vmcp_auth::OAuth2Session;
use vmcp_core::{InvocationContext, VmcpError};
use vmcp_protocol::types::{
    CallToolResult, GetPromptResult, PromptDescriptor, ReadResourceResult, ResourceDescriptor,
    ResourceTemplateDescriptor, ToolDescriptor,
};
use vmcp_transport::{HttpUpstreamTransport, SseUpstreamTransport, TransportError};

use crate::config::{AuthConfig, TransportConfig, UpstreamServerConfig};
use crate::limiter::ConcurrencyLimiter;
use crate::state::SessionState;

enum Channel {
    Http(HttpUpstreamTransport),
    Sse(SseUpstreamTransport),
}

/// Everything discovered for one upstream in one pass (spec §4.3).
#[derive(Debug, Clone, Default)]
pub struct DiscoveredCapabilities {
    pub tools: Vec<ToolDescriptor>,
    pub resources: Vec<ResourceDescriptor>,
    pub resource_templates: Vec<ResourceTemplateDescriptor>,
    pub prompts: Vec<PromptDescriptor>,
}

pub struct UpstreamSession {
    pub config: UpstreamServerConfig,
    state: RwLock<SessionState>,
    last_error: RwLock<Option<String>>,
    channel: RwLock<Option<Channel>>,
    /// Serializes the write side of the underlying channel; responses are
    /// still multiplexed by JSON-RPC id at the transport layer (spec §4.1
    /// "the session serializes writes... multiplexes responses").
    write_lock: Mutex<()>,
    next_request_id: AtomicU64,
    oauth: Option<Arc<OAuth2Session>>,
    limiter: ConcurrencyLimiter,
}

impl UpstreamSession {
    pub fn new(config: UpstreamServerConfig) -> Result<Self, VmcpError> {
        let oauth = match &config.auth {
            AuthConfig::OAuth2(oauth_config) => Some(
                OAuth2Session::new(oauth_config)
                    .map_err(|e| VmcpError::UpstreamProtocol {
                        server: config.name.clone(),
                        detail: e.to_string(),
                    })?,
            ),
            AuthConfig::Static(_) => None,
        };

        let limiter = ConcurrencyLimiter::new(config.max_concurrency, config.queue_bound);

        Ok(Self {
            state: RwLock::new(SessionState::Idle),
            last_error: RwLock::new(None),
            channel: RwLock::new(None),
            write_lock: Mutex::new(()),
            next_request_id: AtomicU64::new(1),
            oauth,
            limiter,
            config,
        })
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    /// `connect()` is valid from any terminal state (spec §4.1).
    pub async fn connect(&self) -> Result<(), VmcpError> {
        {
            let state = self.state.read().await;
            if state.is_connected() {
                return Ok(());
            }
            if !state.is_terminal() {
                return Ok(());
            }
        }
        *self.state.write().await = SessionState::Connecting;

        let channel = match &self.config.transport {
            TransportConfig::Http(http_config) => HttpUpstreamTransport::new(http_config.clone())
                .map(Channel::Http)
                .map_err(|e| self.transport_error_to_vmcp(e)),
            TransportConfig::Sse(sse_config) => SseUpstreamTransport::connect(sse_config.clone())
                .map(Channel::Sse)
                .map_err(|e| self.transport_error_to_vmcp(e)),
        };

        match channel {
            Ok(channel) => {
                *self.channel.write().await = Some(channel);
                *self.state.write().await = SessionState::Connected;
                *self.last_error.write().await = None;
                Ok(())
            }
            Err(err) => {
                self.fail(&err).await;
                Err(err)
            }
        }
    }

    /// Tears the channel down to `disconnected` (spec §4.1, §4.3
    /// "`clear_cache` drops the snapshot and transitions the session
    /// toward `disconnected`").
    pub async fn disconnect(&self) {
        if let Some(Channel::Sse(sse)) = &*self.channel.read().await {
            sse.shutdown();
        }
        *self.channel.write().await = None;
        *self.state.write().await = SessionState::Disconnected;
    }

    /// Wipes stored OAuth tokens and forces `disconnected` (spec §4.1
    /// "Clearing auth...").
    pub async fn clear_auth(&self) {
        if let Some(oauth) = &self.oauth {
            oauth.clear().await;
        }
        self.disconnect().await;
    }

    async fn fail(&self, err: &VmcpError) {
        *self.last_error.write().await = Some(err.to_string());
        *self.state.write().await = SessionState::Error;
    }

    /// A protocol violation observed outside `connect()` (a malformed
    /// response body, an unexpected HTTP status) still marks the session
    /// `error` (spec §7: `UpstreamProtocol` "marks session error").
    async fn mark_protocol_violation(&self, err: VmcpError) -> VmcpError {
        self.fail(&err).await;
        err
    }

    fn transport_error_to_vmcp(&self, err: TransportError) -> VmcpError {
        match err {
            TransportError::AuthRequired => VmcpError::AuthRequired {
                server: self.config.name.clone(),
                authorization_url: None,
            },
            TransportError::Timeout(_) | TransportError::HeartbeatTimeout(_) => {
                VmcpError::UpstreamTimeout {
                    server: self.config.name.clone(),
                }
            }
            TransportError::Connect(_) | TransportError::Reqwest(_) => {
                VmcpError::UpstreamUnavailable {
                    server: self.config.name.clone(),
                }
            }
            TransportError::HttpStatus { status, body_excerpt } => VmcpError::UpstreamProtocol {
                server: self.config.name.clone(),
                detail: format!("HTTP {status}: {body_excerpt}"),
            },
            TransportError::Malformed(detail) => VmcpError::UpstreamProtocol {
                server: self.config.name.clone(),
                detail,
            },
        }
    }

    /// Ensures the session is connected, attempting exactly one implicit
    /// reconnect when it is not (spec §4.1 "A successful operation after
    /// `error`/`disconnected` implies an implicit reconnect").
    async fn ensure_connected(&self) -> Result<(), VmcpError> {
        if self.state().await.is_connected() {
            return Ok(());
        }
        self.connect().await
    }

    fn auth_headers(&self) -> Vec<(String, String)> {
        match &self.config.auth {
            AuthConfig::Static(policy) => policy.static_headers(),
            AuthConfig::OAuth2(_) => Vec::new(),
        }
    }

    async fn oauth_bearer_header(&self) -> Option<(String, String)> {
        let oauth = self.oauth.as_ref()?;
        let header = oauth.bearer_header().await?;
        Some(("authorization".to_string(), header))
    }

    fn next_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::AcqRel)
    }

    /// Issues one JSON-RPC request over whichever channel is live,
    /// re-attempting once after an implicit reconnect or an OAuth token
    /// refresh on a 401 (spec §4.1).
    async fn rpc(&self, method: &str, params: Value, ctx: &InvocationContext) -> Result<Value, VmcpError> {
        self.ensure_connected().await?;

        let attempt = self.rpc_once(method, params.clone()).await;
        match attempt {
            Err(VmcpError::AuthRequired { .. }) if self.oauth.is_some() => {
                let oauth = self.oauth.as_ref().unwrap();
                if oauth.refresh().await.is_ok() {
                    self.rpc_once(method, params).await
                } else {
                    *self.state.write().await = SessionState::AuthRequired;
                    let authorization_url = Some(oauth.authorization_url().await);
                    Err(VmcpError::AuthRequired {
                        server: self.config.name.clone(),
                        authorization_url,
                    })
                }
            }
            Err(VmcpError::UpstreamUnavailable { .. }) => {
                if self.connect().await.is_ok() {
                    self.rpc_once(method, params).await
                } else {
                    Err(VmcpError::UpstreamUnavailable {
                        server: self.config.name.clone(),
                    })
                }
            }
            Err(VmcpError::AuthRequired { authorization_url, .. }) => {
                // Non-OAuth auth (static bearer/apikey/basic/custom headers)
                // has no refresh path: one 401 is terminal.
                *self.state.write().await = SessionState::AuthRequired;
                Err(VmcpError::AuthRequired {
                    server: self.config.name.clone(),
                    authorization_url,
                })
            }
            other => other,
        }
        .map_err(|err| {
            if ctx.is_expired() {
                VmcpError::UpstreamTimeout {
                    server: self.config.name.clone(),
                }
            } else {
                err
            }
        })
    }

    async fn rpc_once(&self, method: &str, params: Value) -> Result<Value, VmcpError> {
        let _write_guard = self.write_lock.lock().await;

        let mut headers = self.auth_headers();
        if let Some(header) = self.oauth_bearer_header().await {
            headers.push(header);
        }

        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id(),
            "method": method,
            "params": params,
        });

        let channel_guard = self.channel.read().await;
        let response = match channel_guard.as_ref() {
            Some(Channel::Http(http)) => http.call(body, &headers).await,
            Some(Channel::Sse(sse)) => sse.post(body, &headers).await,
            None => {
                return Err(VmcpError::UpstreamUnavailable {
                    server: self.config.name.clone(),
                })
            }
        };
        drop(channel_guard);

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                let err = self.transport_error_to_vmcp(e);
                return Err(if matches!(err, VmcpError::UpstreamProtocol { .. }) {
                    self.mark_protocol_violation(err).await
                } else {
                    err
                });
            }
        };

        if let Some(error) = response.get("error") {
            let code = error.get("code").and_then(|c| c.as_i64());
            let detail = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("upstream error")
                .to_string();
            // A JSON-RPC "method not found" for a list-capability call means
            // the upstream simply doesn't support that capability kind; the
            // cache records that as an empty sequence, not an error (spec
            // §4.3).
            if code == Some(-32601) {
                return Err(match method {
                    "tools/list" => VmcpError::UnknownTool(method.to_string()),
                    "resources/list" => VmcpError::UnknownResource(method.to_string()),
                    "prompts/list" => VmcpError::UnknownPrompt(method.to_string()),
                    _ => VmcpError::UpstreamToolError {
                        server: self.config.name.clone(),
                        detail,
                    },
                });
            }
            return Err(VmcpError::UpstreamToolError {
                server: self.config.name.clone(),
                detail,
            });
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    pub async fn ping(&self, ctx: &InvocationContext) -> Result<(), VmcpError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .ok_or_else(|| VmcpError::UpstreamSaturated {
                server: self.config.name.clone(),
            })?;
        self.rpc("ping", json!({}), ctx).await.map(|_| ())
    }

    pub async fn discover_all(&self, ctx: &InvocationContext) -> Result<DiscoveredCapabilities, VmcpError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .ok_or_else(|| VmcpError::UpstreamSaturated {
                server: self.config.name.clone(),
            })?;

        let tools = self.list_tools_raw(ctx).await?;
        let resources = self.list_resources_raw(ctx).await?;
        let prompts = self.list_prompts_raw(ctx).await?;
        debug!(server = %self.config.name, tools = tools.len(), "discovered upstream capabilities");
        Ok(DiscoveredCapabilities {
            tools,
            resources,
            resource_templates: Vec::new(),
            prompts,
        })
    }

    async fn list_tools_raw(&self, ctx: &InvocationContext) -> Result<Vec<ToolDescriptor>, VmcpError> {
        match self.rpc("tools/list", json!({}), ctx).await {
            Ok(value) => match serde_json::from_value(value.get("tools").cloned().unwrap_or(json!([]))) {
                Ok(tools) => Ok(tools),
                Err(e) => Err(self
                    .mark_protocol_violation(VmcpError::UpstreamProtocol {
                        server: self.config.name.clone(),
                        detail: e.to_string(),
                    })
                    .await),
            },
            Err(VmcpError::UnknownTool(_)) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    async fn list_resources_raw(&self, ctx: &InvocationContext) -> Result<Vec<ResourceDescriptor>, VmcpError> {
        match self.rpc("resources/list", json!({}), ctx).await {
            Ok(value) => match serde_json::from_value(value.get("resources").cloned().unwrap_or(json!([]))) {
                Ok(resources) => Ok(resources),
                Err(e) => Err(self
                    .mark_protocol_violation(VmcpError::UpstreamProtocol {
                        server: self.config.name.clone(),
                        detail: e.to_string(),
                    })
                    .await),
            },
            Err(VmcpError::UnknownResource(_)) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    async fn list_prompts_raw(&self, ctx: &InvocationContext) -> Result<Vec<PromptDescriptor>, VmcpError> {
        match self.rpc("prompts/list", json!({}), ctx).await {
            Ok(value) => match serde_json::from_value(value.get("prompts").cloned().unwrap_or(json!([]))) {
                Ok(prompts) => Ok(prompts),
                Err(e) => Err(self
                    .mark_protocol_violation(VmcpError::UpstreamProtocol {
                        server: self.config.name.clone(),
                        detail: e.to_string(),
                    })
                    .await),
            },
            Err(VmcpError::UnknownPrompt(_)) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    pub async fn call_tool(
        &self,
        name: &str,
        args: Value,
        ctx: &InvocationContext,
    ) -> Result<CallToolResult, VmcpError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .ok_or_else(|| VmcpError::UpstreamSaturated {
                server: self.config.name.clone(),
            })?;

        let result = self
            .rpc("tools/call", json!({"name": name, "arguments": args}), ctx)
            .await?;
        match serde_json::from_value(result) {
            Ok(result) => Ok(result),
            Err(e) => Err(self
                .mark_protocol_violation(VmcpError::UpstreamProtocol {
                    server: self.config.name.clone(),
                    detail: e.to_string(),
                })
                .await),
        }
    }

    pub async fn read_resource(
        &self,
        uri: &str,
        ctx: &InvocationContext,
    ) -> Result<ReadResourceResult, VmcpError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .ok_or_else(|| VmcpError::UpstreamSaturated {
                server: self.config.name.clone(),
            })?;

        let result = self
            .rpc("resources/read", json!({"uri": uri}), ctx)
            .await?;
        match serde_json::from_value(result) {
            Ok(result) => Ok(result),
            Err(e) => Err(self
                .mark_protocol_violation(VmcpError::UpstreamProtocol {
                    server: self.config.name.clone(),
                    detail: e.to_string(),
                })
                .await),
        }
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        args: Value,
        ctx: &InvocationContext,
    ) -> Result<GetPromptResult, VmcpError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .ok_or_else(|| VmcpError::UpstreamSaturated {
                server: self.config.name.clone(),
            })?;

        let result = self
            .rpc("prompts/get", json!({"name": name, "arguments": args}), ctx)
            .await?;
        match serde_json::from_value(result) {
            Ok(result) => Ok(result),
            Err(e) => Err(self
                .mark_protocol_violation(VmcpError::UpstreamProtocol {
                    server: self.config.name.clone(),
                    detail: e.to_string(),
                })
                .await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmcp_core::{EnvMap, VmcpId};
    use vmcp_transport::HttpTransportConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx() -> InvocationContext {
        InvocationContext::new(
            VmcpId::new("v1"),
            EnvMap::default(),
            std::time::Duration::from_secs(30),
            8,
        )
    }

    fn http_config(endpoint: String) -> UpstreamServerConfig {
        UpstreamServerConfig::new(
            "s1",
            "search",
            TransportConfig::Http(HttpTransportConfig {
                endpoint,
                ..Default::default()
            }),
        )
    }

    #[tokio::test]
    async fn connect_transitions_idle_to_connected() {
        let server = MockServer::start().await;
        let session = UpstreamSession::new(http_config(format!("{}/rpc", server.uri()))).unwrap();
        assert_eq!(session.state().await, SessionState::Idle);
        // no mock mounted: HTTP transport construction succeeds without a
        // network round trip, so connect() should reach `connected`.
        session.connect().await.unwrap();
        assert_eq!(session.state().await, SessionState::Connected);
    }

    #[tokio::test]
    async fn call_tool_round_trips_through_mock_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"content": [{"type": "text", "text": "ok"}], "isError": false}
            })))
            .mount(&server)
            .await;

        let session = UpstreamSession::new(http_config(format!("{}/rpc", server.uri()))).unwrap();
        let result = session
            .call_tool("search", json!({"q": "rust"}), &ctx())
            .await
            .unwrap();
        assert_eq!(result.content.len(), 1);
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn method_not_found_surfaces_as_empty_sequence_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32601, "message": "method not found"}
            })))
            .mount(&server)
            .await;

        let session = UpstreamSession::new(http_config(format!("{}/rpc", server.uri()))).unwrap();
        let caps = session.discover_all(&ctx()).await.unwrap();
        assert!(caps.tools.is_empty());
        assert!(caps.resources.is_empty());
        assert!(caps.prompts.is_empty());
    }
}
