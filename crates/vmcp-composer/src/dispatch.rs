//! Dispatch (spec §4.6): resolves an exposed name through a [`Snapshot`]'s
//! reverse map, routes to the owning custom engine or upstream, validates
//! input against the declared schema, binds environment, and emits one
//! usage-log row per completed operation.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::Value;
use tracing::warn;

use vmcp_core::blob::BlobStore;
use vmcp_core::usage::{UsageLogEvent, UsageLogSink, UsageOutcome};
use vmcp_core::{EnvMap, InvocationContext, VmcpError};
use vmcp_protocol::types::{
    CallToolResult, ContentPart, GetPromptResult, PromptDescriptor, ReadResourceResult,
    ResourceDescriptor, ResourceTemplateDescriptor, ToolDescriptor,
};
use vmcp_template::{Backend, TemplateEngine};
use vmcp_tools::{CustomToolDef, HttpEngine, PromptEngine, ScriptEngine};
use vmcp_upstream::UpstreamOperations;
use vmcp_upstream::UpstreamRegistry;
use vmcp_upstream::SessionState;

use crate::snapshot::{self, Snapshot};
use crate::types::{EnvOverrides, Origin, ResourceContent, ReverseEntry, Vmcp};

/// Merges a vMCP's declared environment defaults with request-supplied
/// overrides, then freezes the result into a fresh [`InvocationContext`]
/// (spec §4.6 "Environment binding").
pub fn build_context(vmcp: &Vmcp, overrides: &EnvOverrides, deadline: Duration, max_depth: usize) -> InvocationContext {
    let env = EnvMap::new(vmcp.env.clone()).merge_overrides(overrides);
    InvocationContext::new(vmcp.id.clone(), env, deadline, max_depth)
}

fn now_epoch_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

fn validate_required(schema: &Value, args: &Value) -> Result<(), VmcpError> {
    let Some(required) = schema.get("required").and_then(Value::as_array) else {
        return Ok(());
    };
    let provided = args.as_object();
    for field in required {
        let Some(field_name) = field.as_str() else { continue };
        let present = provided.map(|obj| obj.contains_key(field_name)).unwrap_or(false);
        if !present {
            return Err(VmcpError::BadArguments(format!("missing required argument \"{field_name}\"")));
        }
    }
    Ok(())
}

fn literal_content(bytes: &[u8], mime_type: Option<&str>) -> ContentPart {
    let is_text = mime_type.map(|m| m.starts_with("text/") || m == "application/json").unwrap_or(true);
    if is_text {
        ContentPart::Text { text: String::from_utf8_lossy(bytes).into_owned() }
    } else {
        ContentPart::Binary {
            mime_type: mime_type.unwrap_or("application/octet-stream").to_string(),
            data_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

fn server_name_of(entry: &ReverseEntry) -> Option<String> {
    match &entry.origin {
        Origin::Upstream(id) => Some(id.as_str().to_string()),
        Origin::Custom => None,
    }
}

/// Aggregates one vMCP's upstreams and custom definitions into a single
/// MCP surface (spec §4.6).
pub struct Composer {
    registry: Arc<UpstreamRegistry>,
    script_engine: ScriptEngine,
    http_engine: HttpEngine,
    prompt_engine: PromptEngine,
    blob_store: Arc<dyn BlobStore>,
    usage_log: Arc<dyn UsageLogSink>,
}

impl Composer {
    pub fn new(
        registry: Arc<UpstreamRegistry>,
        script_engine: ScriptEngine,
        http_engine: HttpEngine,
        blob_store: Arc<dyn BlobStore>,
        usage_log: Arc<dyn UsageLogSink>,
    ) -> Self {
        Self {
            registry,
            script_engine,
            http_engine,
            prompt_engine: PromptEngine::default(),
            blob_store,
            usage_log,
        }
    }

    async fn snapshot(&self, vmcp: &Vmcp, ctx: &InvocationContext) -> Result<Snapshot, VmcpError> {
        snapshot::build(vmcp, &self.registry, ctx, now_epoch_ms()).await
    }

    /// The snapshot silently skips upstreams not in `connected` state (spec
    /// §4.6), so a name lookup failure can't distinguish "genuinely unknown"
    /// from "owned by an upstream we couldn't list". Per the Open Question
    /// decision recorded in DESIGN.md, an `auth_required` upstream fails
    /// fast with `AuthRequired` instead of being silently omitted.
    async fn auth_required_upstream(&self, vmcp: &Vmcp) -> Option<VmcpError> {
        for id in &vmcp.upstream_refs {
            if self.registry.status_of(id).await == Some(SessionState::AuthRequired) {
                return Some(VmcpError::AuthRequired { server: id.as_str().to_string(), authorization_url: None });
            }
        }
        None
    }

    pub async fn list_tools(&self, vmcp: &Vmcp, ctx: &InvocationContext) -> Result<Vec<ToolDescriptor>, VmcpError> {
        Ok(self.snapshot(vmcp, ctx).await?.tools)
    }

    pub async fn list_resources(&self, vmcp: &Vmcp, ctx: &InvocationContext) -> Result<Vec<ResourceDescriptor>, VmcpError> {
        Ok(self.snapshot(vmcp, ctx).await?.resources)
    }

    pub async fn list_resource_templates(
        &self,
        vmcp: &Vmcp,
        ctx: &InvocationContext,
    ) -> Result<Vec<ResourceTemplateDescriptor>, VmcpError> {
        Ok(self.snapshot(vmcp, ctx).await?.resource_templates)
    }

    pub async fn list_prompts(&self, vmcp: &Vmcp, ctx: &InvocationContext) -> Result<Vec<PromptDescriptor>, VmcpError> {
        Ok(self.snapshot(vmcp, ctx).await?.prompts)
    }

    /// `system_prompt` is always rendered locally through the Template
    /// Engine, never dispatched to an upstream (spec §4.6); an unset
    /// system prompt renders as an empty string.
    pub async fn system_prompt(&self, vmcp: &Vmcp, ctx: &InvocationContext) -> Result<String, VmcpError> {
        if vmcp.system_prompt.is_empty() {
            return Ok(String::new());
        }
        let snapshot = self.snapshot(vmcp, ctx).await?;
        let backend = RequestBackend { composer: self, vmcp, snapshot: &snapshot, params: Value::Object(Default::default()), env: ctx.env.clone() };
        TemplateEngine::render(&vmcp.system_prompt, &backend, ctx).await
    }

    pub async fn call_tool(
        &self,
        vmcp: &Vmcp,
        exposed_name: &str,
        args: Value,
        ctx: &InvocationContext,
    ) -> Result<CallToolResult, VmcpError> {
        let started = Instant::now();
        let snapshot = self.snapshot(vmcp, ctx).await;
        let outcome = match &snapshot {
            Ok(snapshot) => self.dispatch_tool(vmcp, snapshot, exposed_name, args, ctx).await,
            Err(err) => Err(err.clone()),
        };
        let server_name = snapshot.ok().and_then(|s| s.tool_owner(exposed_name).and_then(server_name_of));
        self.log_usage(vmcp, "tools/call", Some(exposed_name.to_string()), server_name, started, &outcome).await;
        outcome
    }

    pub async fn read_resource(
        &self,
        vmcp: &Vmcp,
        exposed_uri: &str,
        ctx: &InvocationContext,
    ) -> Result<ReadResourceResult, VmcpError> {
        let started = Instant::now();
        let snapshot = self.snapshot(vmcp, ctx).await;
        let outcome = match &snapshot {
            Ok(snapshot) => self.dispatch_resource(vmcp, snapshot, exposed_uri, ctx).await,
            Err(err) => Err(err.clone()),
        };
        self.log_usage(vmcp, "resources/read", None, None, started, &outcome).await;
        outcome
    }

    pub async fn get_prompt(
        &self,
        vmcp: &Vmcp,
        exposed_name: &str,
        args: Value,
        ctx: &InvocationContext,
    ) -> Result<GetPromptResult, VmcpError> {
        let started = Instant::now();
        let snapshot = self.snapshot(vmcp, ctx).await;
        let outcome = match &snapshot {
            Ok(snapshot) => self.dispatch_prompt(vmcp, snapshot, exposed_name, args, ctx).await,
            Err(err) => Err(err.clone()),
        };
        self.log_usage(vmcp, "prompts/get", Some(exposed_name.to_string()), None, started, &outcome).await;
        outcome
    }

    async fn log_usage<T>(
        &self,
        vmcp: &Vmcp,
        method: &str,
        tool_name: Option<String>,
        server_name: Option<String>,
        started: Instant,
        outcome: &Result<T, VmcpError>,
    ) {
        let outcome = match outcome {
            Ok(_) => UsageOutcome::Success,
            Err(err) => {
                warn!(vmcp = %vmcp.name, method, error = %err, "operation failed");
                UsageOutcome::Error(err.kind())
            }
        };
        self.usage_log
            .record(UsageLogEvent {
                vmcp_id: vmcp.id.clone(),
                method: method.to_string(),
                tool_name,
                server_name,
                duration_ms: started.elapsed().as_millis() as u64,
                outcome,
            })
            .await;
    }

    async fn dispatch_tool(
        &self,
        vmcp: &Vmcp,
        snapshot: &Snapshot,
        exposed_name: &str,
        args: Value,
        ctx: &InvocationContext,
    ) -> Result<CallToolResult, VmcpError> {
        let owner = match snapshot.tool_owner(exposed_name) {
            Some(owner) => owner,
            None => {
                if let Some(err) = self.auth_required_upstream(vmcp).await {
                    return Err(err);
                }
                return Err(VmcpError::UnknownTool(exposed_name.to_string()));
            }
        };
        match &owner.origin {
            Origin::Custom => {
                let def = vmcp
                    .custom_tools
                    .iter()
                    .find(|d| d.name() == owner.local_name)
                    .ok_or_else(|| VmcpError::UnknownTool(exposed_name.to_string()))?;
                validate_required(def.input_schema(), &args)?;
                self.execute_custom_tool(vmcp, snapshot, def, args, ctx).await
            }
            Origin::Upstream(server_id) => {
                UpstreamOperations::new(&self.registry, server_id.clone())
                    .call_tool(&owner.local_name, args, ctx)
                    .await
            }
        }
    }

    async fn execute_custom_tool(
        &self,
        vmcp: &Vmcp,
        snapshot: &Snapshot,
        def: &CustomToolDef,
        args: Value,
        ctx: &InvocationContext,
    ) -> Result<CallToolResult, VmcpError> {
        let backend = RequestBackend { composer: self, vmcp, snapshot, params: args.clone(), env: ctx.env.clone() };
        match def {
            CustomToolDef::Script(d) => self.script_engine.execute(d, args, ctx).await,
            CustomToolDef::Http(d) => self.http_engine.execute(d, &backend, ctx).await,
            CustomToolDef::Prompt(d) => {
                let result = self.prompt_engine.render(d, &backend, ctx).await?;
                Ok(CallToolResult { content: result.content, is_error: false })
            }
        }
    }

    async fn dispatch_resource(
        &self,
        vmcp: &Vmcp,
        snapshot: &Snapshot,
        exposed_uri: &str,
        ctx: &InvocationContext,
    ) -> Result<ReadResourceResult, VmcpError> {
        let owner = match snapshot.resource_owner(exposed_uri) {
            Some(owner) => owner,
            None => {
                if let Some(err) = self.auth_required_upstream(vmcp).await {
                    return Err(err);
                }
                return Err(VmcpError::UnknownResource(exposed_uri.to_string()));
            }
        };
        match &owner.origin {
            Origin::Custom => {
                let resource = vmcp
                    .custom_resources
                    .iter()
                    .find(|r| r.uri == owner.local_name)
                    .ok_or_else(|| VmcpError::UnknownResource(exposed_uri.to_string()))?;
                let content = match &resource.content {
                    ResourceContent::Literal(bytes) => literal_content(bytes, resource.mime_type.as_deref()),
                    ResourceContent::Blob { blob_id } => {
                        let (meta, bytes) = self
                            .blob_store
                            .get(blob_id)
                            .await
                            .map_err(|e| VmcpError::UnknownResource(format!("{exposed_uri}: {e}")))?;
                        literal_content(&bytes, Some(&meta.mime))
                    }
                };
                Ok(ReadResourceResult { uri: exposed_uri.to_string(), mime_type: resource.mime_type.clone(), content: vec![content] })
            }
            Origin::Upstream(server_id) => {
                UpstreamOperations::new(&self.registry, server_id.clone())
                    .read_resource(&owner.local_name, ctx)
                    .await
            }
        }
    }

    async fn dispatch_prompt(
        &self,
        vmcp: &Vmcp,
        snapshot: &Snapshot,
        exposed_name: &str,
        args: Value,
        ctx: &InvocationContext,
    ) -> Result<GetPromptResult, VmcpError> {
        let owner = match snapshot.prompt_owner(exposed_name) {
            Some(owner) => owner,
            None => {
                if let Some(err) = self.auth_required_upstream(vmcp).await {
                    return Err(err);
                }
                return Err(VmcpError::UnknownPrompt(exposed_name.to_string()));
            }
        };
        match &owner.origin {
            Origin::Custom => {
                let def = vmcp
                    .custom_prompts
                    .iter()
                    .find(|p| p.name == owner.local_name)
                    .ok_or_else(|| VmcpError::UnknownPrompt(exposed_name.to_string()))?;
                validate_required(&def.input_schema, &args)?;
                let backend = RequestBackend { composer: self, vmcp, snapshot, params: args, env: ctx.env.clone() };
                self.prompt_engine.render(def, &backend, ctx).await
            }
            Origin::Upstream(server_id) => {
                UpstreamOperations::new(&self.registry, server_id.clone())
                    .get_prompt(&owner.local_name, args, ctx)
                    .await
            }
        }
    }
}

/// The [`Backend`] a nested `@tool`/`@resource`/`@prompt` expression sees
/// while rendering a custom tool or prompt's template: it routes back
/// through the same exposed-name resolution the top-level API uses, so a
/// nested call can reach any tool visible on this vMCP, not just upstream
/// calls (spec §4.4/§4.6 interplay).
struct RequestBackend<'a> {
    composer: &'a Composer,
    vmcp: &'a Vmcp,
    snapshot: &'a Snapshot,
    params: Value,
    env: EnvMap,
}

#[async_trait]
impl<'a> Backend for RequestBackend<'a> {
    fn param(&self, name: &str) -> Option<Value> {
        self.params.get(name).cloned()
    }

    fn config(&self, name: &str) -> Option<String> {
        self.env.get(name).map(str::to_string)
    }

    fn mustache_params(&self) -> Value {
        self.params.clone()
    }

    fn resource_alias(&self, alias: &str) -> Option<String> {
        self.vmcp.custom_resources.iter().find(|r| r.name == alias).map(|r| r.uri.clone())
    }

    async fn call_tool(&self, name: &str, args: Value, ctx: &InvocationContext) -> Result<CallToolResult, VmcpError> {
        self.composer.dispatch_tool(self.vmcp, self.snapshot, name, args, ctx).await
    }

    async fn read_resource(&self, uri: &str, ctx: &InvocationContext) -> Result<ReadResourceResult, VmcpError> {
        self.composer.dispatch_resource(self.vmcp, self.snapshot, uri, ctx).await
    }

    async fn render_prompt(&self, name: &str, args: Value, ctx: &InvocationContext) -> Result<GetPromptResult, VmcpError> {
        self.composer.dispatch_prompt(self.vmcp, self.snapshot, name, args, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use vmcp_core::usage::InMemoryUsageLog;
    use vmcp_core::VmcpId;
    use vmcp_tools::PromptToolDef;

    fn vmcp_with_prompt() -> Vmcp {
        Vmcp {
            id: VmcpId::new("v1"),
            name: "demo".to_string(),
            description: None,
            upstream_refs: Vec::new(),
            custom_tools: Vec::new(),
            custom_resources: Vec::new(),
            custom_prompts: vec![PromptToolDef {
                name: "brief".to_string(),
                description: None,
                input_schema: json!({"type": "object", "required": ["topic"]}),
                body_template: "Topic: @param.topic".to_string(),
            }],
            system_prompt: String::new(),
            env: HashMap::new(),
        }
    }

    fn composer() -> Composer {
        Composer::new(
            Arc::new(UpstreamRegistry::new()),
            ScriptEngine::new(2),
            HttpEngine::default(),
            Arc::new(vmcp_core::blob::InMemoryBlobStore::default()),
            Arc::new(InMemoryUsageLog::default()),
        )
    }

    fn ctx(vmcp: &Vmcp) -> InvocationContext {
        build_context(vmcp, &EnvOverrides::new(), Duration::from_secs(30), 8)
    }

    #[tokio::test]
    async fn get_prompt_renders_custom_prompt_template() {
        let vmcp = vmcp_with_prompt();
        let composer = composer();
        let context = ctx(&vmcp);
        let result = composer.get_prompt(&vmcp, "brief", json!({"topic": "rust"}), &context).await.unwrap();
        match &result.content[0] {
            ContentPart::Text { text } => assert_eq!(text, "Topic: rust"),
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_required_argument_is_bad_arguments_without_dispatch() {
        let vmcp = vmcp_with_prompt();
        let composer = composer();
        let context = ctx(&vmcp);
        let err = composer.get_prompt(&vmcp, "brief", json!({}), &context).await.unwrap_err();
        assert!(matches!(err, VmcpError::BadArguments(_)));
    }

    #[tokio::test]
    async fn unknown_exposed_name_is_unknown_prompt() {
        let vmcp = vmcp_with_prompt();
        let composer = composer();
        let context = ctx(&vmcp);
        let err = composer.get_prompt(&vmcp, "missing", json!({}), &context).await.unwrap_err();
        assert!(matches!(err, VmcpError::UnknownPrompt(_)));
    }

    #[tokio::test]
    async fn empty_system_prompt_renders_empty_string() {
        let vmcp = vmcp_with_prompt();
        let composer = composer();
        let context = ctx(&vmcp);
        assert_eq!(composer.system_prompt(&vmcp, &context).await.unwrap(), "");
    }
}
