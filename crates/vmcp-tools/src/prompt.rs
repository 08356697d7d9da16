//! Prompt engine (spec §4.5 "Prompt engine"): renders a custom prompt's
//! body through the Template Engine; the rendered text is the prompt's
//! entire result.

use vmcp_core::{InvocationContext, VmcpError};
use vmcp_protocol::types::{ContentPart, GetPromptResult};
use vmcp_template::{Backend, TemplateEngine};

use crate::types::PromptToolDef;

#[derive(Default)]
pub struct PromptEngine;

impl PromptEngine {
    pub async fn render(
        &self,
        def: &PromptToolDef,
        backend: &dyn Backend,
        ctx: &InvocationContext,
    ) -> Result<GetPromptResult, VmcpError> {
        let text = TemplateEngine::render(&def.body_template, backend, ctx).await?;
        Ok(GetPromptResult {
            description: def.description.clone(),
            content: vec![ContentPart::Text { text }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vmcp_core::{EnvMap, VmcpId};
    use vmcp_protocol::types::{CallToolResult, ReadResourceResult};

    struct SearchBackend {
        params: Value,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Backend for SearchBackend {
        fn param(&self, name: &str) -> Option<Value> {
            self.params.get(name).cloned()
        }
        fn config(&self, _name: &str) -> Option<String> {
            None
        }
        fn mustache_params(&self) -> Value {
            self.params.clone()
        }
        fn resource_alias(&self, _alias: &str) -> Option<String> {
            None
        }
        async fn call_tool(&self, name: &str, args: Value, _ctx: &InvocationContext) -> Result<CallToolResult, VmcpError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(name, "search");
            assert_eq!(args.get("q").and_then(Value::as_str), Some("rafts"));
            Ok(CallToolResult {
                content: vec![ContentPart::Text { text: "X,Y,Z".to_string() }],
                is_error: false,
            })
        }
        async fn read_resource(&self, uri: &str, _ctx: &InvocationContext) -> Result<ReadResourceResult, VmcpError> {
            Err(VmcpError::UnknownResource(uri.to_string()))
        }
        async fn render_prompt(&self, name: &str, _args: Value, _ctx: &InvocationContext) -> Result<GetPromptResult, VmcpError> {
            Err(VmcpError::UnknownPrompt(name.to_string()))
        }
    }

    fn ctx() -> InvocationContext {
        InvocationContext::new(VmcpId::new("v1"), EnvMap::default(), std::time::Duration::from_secs(30), 8)
    }

    #[tokio::test]
    async fn nested_tool_call_renders_into_prompt_body() {
        let def = PromptToolDef {
            name: "brief".to_string(),
            description: None,
            input_schema: json!({}),
            body_template: r#"Summarize: @tool("search", {"q": "@param.topic"})"#.to_string(),
        };
        let backend = SearchBackend { params: json!({"topic": "rafts"}), calls: AtomicUsize::new(0) };
        let engine = PromptEngine;
        let result = engine.render(&def, &backend, &ctx()).await.unwrap();
        assert_eq!(result.content.len(), 1);
        match &result.content[0] {
            ContentPart::Text { text } => assert_eq!(text, "Summarize: X,Y,Z"),
            _ => panic!("expected text part"),
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }
}
