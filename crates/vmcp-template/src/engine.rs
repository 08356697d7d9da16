//! Ties the expression scanner, the backend, and the mustache pass together
//! (spec §4.4): each literal segment runs through the mustache layer on
//! its own, and each expression is resolved and substituted verbatim, so
//! substituted content is never re-scanned by the text-template layer.

use serde_json::Value;

use vmcp_core::{InvocationContext, NestedKind, VmcpError};

use crate::backend::Backend;
use crate::expr::{scan, Expr, ResourceTarget, Segment};
use crate::mustache;
use crate::rendering::{render_content, render_value};

pub struct TemplateEngine;

impl TemplateEngine {
    /// Renders `text` against `backend`/`ctx`'s parameter namespace (spec
    /// §4.4 (a) then (b), in order).
    pub async fn render(text: &str, backend: &dyn Backend, ctx: &InvocationContext) -> Result<String, VmcpError> {
        let segments = scan(text)?;
        let mustache_params = backend.mustache_params();
        let mut output = String::new();
        for segment in segments {
            match segment {
                // Mustache runs only over the template's own literal text,
                // never over substituted expression output — otherwise a
                // `{{...}}`-shaped value injected by `@param`/`@tool`/
                // `@resource` would get reinterpreted by this second pass.
                Segment::Literal(literal) => output.push_str(&mustache::render(&literal, &mustache_params)),
                Segment::Expr { offset, expr } => {
                    let rendered = Self::resolve(&expr, offset, backend, ctx).await?;
                    output.push_str(&rendered);
                }
            }
        }

        Ok(output)
    }

    async fn resolve(
        expr: &Expr,
        offset: usize,
        backend: &dyn Backend,
        ctx: &InvocationContext,
    ) -> Result<String, VmcpError> {
        match expr {
            Expr::Param(name) => Ok(backend.param(name).as_ref().map(render_value).unwrap_or_default()),
            Expr::Config(name) => backend
                .config(name)
                .ok_or_else(|| VmcpError::TemplateMissingConfig { name: name.clone() }),
            Expr::Tool { name, args } => Self::resolve_tool(name, args.clone(), offset, backend, ctx).await,
            Expr::Prompt { name, args } => Self::resolve_prompt(name, args.clone(), offset, backend, ctx).await,
            Expr::Resource(target) => Self::resolve_resource(target, offset, backend, ctx).await,
        }
    }

    async fn resolve_tool(
        name: &str,
        args: Value,
        offset: usize,
        backend: &dyn Backend,
        ctx: &InvocationContext,
    ) -> Result<String, VmcpError> {
        let canonical_args = args.to_string();
        if let Some(cached) = ctx.memo.get_call(NestedKind::Tool, name, &canonical_args) {
            return Ok(cached);
        }

        let _depth_guard = ctx.enter_nested(&format!("@tool(\"{name}\") at byte {offset}"))?;
        let rendered_args = render_json_strings(&args, backend, ctx).await?;
        let result = backend
            .call_tool(name, rendered_args, ctx)
            .await
            .map_err(|err| wrap_with_location(err, "@tool", name, offset))?;
        let rendered = render_content(&result.content);
        ctx.memo.put_call(NestedKind::Tool, name, &canonical_args, rendered.clone());
        Ok(rendered)
    }

    async fn resolve_prompt(
        name: &str,
        args: Value,
        offset: usize,
        backend: &dyn Backend,
        ctx: &InvocationContext,
    ) -> Result<String, VmcpError> {
        let canonical_args = args.to_string();
        if let Some(cached) = ctx.memo.get_call(NestedKind::Prompt, name, &canonical_args) {
            return Ok(cached);
        }

        let _depth_guard = ctx.enter_nested(&format!("@prompt(\"{name}\") at byte {offset}"))?;
        let rendered_args = render_json_strings(&args, backend, ctx).await?;
        let result = backend
            .render_prompt(name, rendered_args, ctx)
            .await
            .map_err(|err| wrap_with_location(err, "@prompt", name, offset))?;
        let rendered = render_content(&result.content);
        ctx.memo.put_call(NestedKind::Prompt, name, &canonical_args, rendered.clone());
        Ok(rendered)
    }

    async fn resolve_resource(
        target: &ResourceTarget,
        offset: usize,
        backend: &dyn Backend,
        ctx: &InvocationContext,
    ) -> Result<String, VmcpError> {
        let uri = match target {
            ResourceTarget::Uri(uri) => uri.clone(),
            ResourceTarget::Alias(alias) => backend.resource_alias(alias).ok_or_else(|| {
                VmcpError::TemplateUnknownTarget { kind: "resource", name: alias.clone() }
            })?,
        };

        if let Some(cached) = ctx.memo.get_resource(&uri) {
            return Ok(cached);
        }

        let _depth_guard = ctx.enter_nested(&format!("@resource(\"{uri}\") at byte {offset}"))?;
        let result = backend
            .read_resource(&uri, ctx)
            .await
            .map_err(|err| wrap_with_location(err, "@resource", &uri, offset))?;
        let rendered = render_content(&result.content);
        ctx.memo.put_resource(&uri, rendered.clone());
        Ok(rendered)
    }
}

/// Recursively renders every string leaf of a `@tool`/`@prompt` argument
/// object through the Template Engine (spec §1/§4.4: substitution applies
/// "inside prompts and tool inputs, including recursive invocations").
/// Boxed because an async fn can't recurse into itself directly.
fn render_json_strings<'a>(
    value: &'a Value,
    backend: &'a dyn Backend,
    ctx: &'a InvocationContext,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, VmcpError>> + Send + 'a>> {
    Box::pin(async move {
        match value {
            Value::String(s) => Ok(Value::String(TemplateEngine::render(s, backend, ctx).await?)),
            Value::Array(items) => {
                let mut rendered = Vec::with_capacity(items.len());
                for item in items {
                    rendered.push(render_json_strings(item, backend, ctx).await?);
                }
                Ok(Value::Array(rendered))
            }
            Value::Object(map) => {
                let mut rendered = serde_json::Map::with_capacity(map.len());
                for (key, val) in map {
                    rendered.insert(key.clone(), render_json_strings(val, backend, ctx).await?);
                }
                Ok(Value::Object(rendered))
            }
            other => Ok(other.clone()),
        }
    })
}

/// Wraps a nested-call failure with its source expression's location
/// (spec §4.4 "Nested call failures propagate with their class, wrapped to
/// include the expression location"), while preserving the error's class.
fn wrap_with_location(err: VmcpError, form: &str, name: &str, offset: usize) -> VmcpError {
    let location = format!("{form}(\"{name}\") at byte {offset}");
    match err {
        VmcpError::UpstreamToolError { server, detail } => VmcpError::UpstreamToolError {
            server,
            detail: format!("{detail} (from {location})"),
        },
        VmcpError::UpstreamProtocol { server, detail } => VmcpError::UpstreamProtocol {
            server,
            detail: format!("{detail} (from {location})"),
        },
        VmcpError::ToolCrash { tool, detail } => {
            VmcpError::ToolCrash { tool, detail: format!("{detail} (from {location})") }
        }
        VmcpError::ToolBadOutput { tool, detail } => {
            VmcpError::ToolBadOutput { tool, detail: format!("{detail} (from {location})") }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use vmcp_core::{EnvMap, VmcpId};
    use vmcp_protocol::types::{ContentPart, GetPromptResult, ReadResourceResult};

    struct FakeBackend {
        params: Value,
        configs: HashMap<String, String>,
        tool_calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Backend for FakeBackend {
        fn param(&self, name: &str) -> Option<Value> {
            self.params.get(name).cloned()
        }

        fn config(&self, name: &str) -> Option<String> {
            self.configs.get(name).cloned()
        }

        fn mustache_params(&self) -> Value {
            self.params.clone()
        }

        fn resource_alias(&self, alias: &str) -> Option<String> {
            if alias == "docs" {
                Some("file:///docs.txt".to_string())
            } else {
                None
            }
        }

        async fn call_tool(
            &self,
            name: &str,
            _args: Value,
            _ctx: &InvocationContext,
        ) -> Result<vmcp_protocol::types::CallToolResult, VmcpError> {
            self.tool_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if name == "search" {
                Ok(vmcp_protocol::types::CallToolResult {
                    content: vec![ContentPart::Text { text: "result-X".to_string() }],
                    is_error: false,
                })
            } else {
                Err(VmcpError::UnknownTool(name.to_string()))
            }
        }

        async fn read_resource(
            &self,
            uri: &str,
            _ctx: &InvocationContext,
        ) -> Result<ReadResourceResult, VmcpError> {
            Ok(ReadResourceResult {
                uri: uri.to_string(),
                mime_type: Some("text/plain".to_string()),
                content: vec![ContentPart::Text { text: "doc body".to_string() }],
            })
        }

        async fn render_prompt(
            &self,
            name: &str,
            _args: Value,
            _ctx: &InvocationContext,
        ) -> Result<GetPromptResult, VmcpError> {
            Ok(GetPromptResult {
                description: None,
                content: vec![ContentPart::Text { text: format!("prompt:{name}") }],
            })
        }
    }

    fn ctx(max_depth: usize) -> InvocationContext {
        InvocationContext::new(
            VmcpId::new("v1"),
            EnvMap::default(),
            std::time::Duration::from_secs(30),
            max_depth,
        )
    }

    #[tokio::test]
    async fn renders_param_verbatim_for_any_string() {
        let backend = FakeBackend {
            params: json!({"x": "hello @world {{not a tag}}"}),
            configs: HashMap::new(),
            tool_calls: Default::default(),
        };
        let rendered = TemplateEngine::render("@param.x", &backend, &ctx(8)).await.unwrap();
        assert_eq!(rendered, "hello @world {{not a tag}}");
    }

    #[tokio::test]
    async fn missing_config_is_an_error() {
        let backend = FakeBackend { params: json!({}), configs: HashMap::new(), tool_calls: Default::default() };
        let err = TemplateEngine::render("@config.MISSING", &backend, &ctx(8)).await.unwrap_err();
        assert!(matches!(err, VmcpError::TemplateMissingConfig { name } if name == "MISSING"));
    }

    #[tokio::test]
    async fn tool_call_result_is_memoized_within_one_request() {
        let backend = FakeBackend { params: json!({}), configs: HashMap::new(), tool_calls: Default::default() };
        let context = ctx(8);
        let first = TemplateEngine::render(r#"@tool("search", {})"#, &backend, &context).await.unwrap();
        let second = TemplateEngine::render(r#"@tool("search", {})"#, &backend, &context).await.unwrap();
        assert_eq!(first, "result-X");
        assert_eq!(second, "result-X");
        assert_eq!(backend.tool_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_resource_alias_is_a_template_unknown_target_error() {
        let backend = FakeBackend { params: json!({}), configs: HashMap::new(), tool_calls: Default::default() };
        let err = TemplateEngine::render("@resource.missing", &backend, &ctx(8)).await.unwrap_err();
        assert!(matches!(err, VmcpError::TemplateUnknownTarget { kind: "resource", .. }));
    }

    #[tokio::test]
    async fn recursion_bound_trips_cleanly() {
        let backend = FakeBackend { params: json!({}), configs: HashMap::new(), tool_calls: Default::default() };
        // max_depth 0 means the very first nested call already exceeds it.
        let err = TemplateEngine::render(r#"@tool("search", {})"#, &backend, &ctx(0)).await.unwrap_err();
        assert!(matches!(err, VmcpError::TemplateRecursion { max_depth: 0, .. }));
    }

    #[tokio::test]
    async fn mustache_layer_runs_after_expression_substitution() {
        let backend = FakeBackend {
            params: json!({"name": "Ada", "show": true}),
            configs: HashMap::new(),
            tool_calls: Default::default(),
        };
        let rendered = TemplateEngine::render(
            "@param.name {{#if show}}is here{{/if}}",
            &backend,
            &ctx(8),
        )
        .await
        .unwrap();
        assert_eq!(rendered, "Ada is here");
    }
}
