//! HTTP engine (spec §4.5 "HTTP engine"): renders method/url/headers/body
//! through the Template Engine, then issues the request with a bounded
//! redirect policy and connect/total timeouts.

use std::time::Duration;

use base64::Engine as _;
use reqwest::redirect::Policy;

use vmcp_core::{InvocationContext, VmcpError};
use vmcp_protocol::types::{CallToolResult, ContentPart};
use vmcp_template::{Backend, TemplateEngine};

use crate::types::{HttpAuthBinding, HttpToolDef, ResponseKind};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_REDIRECTS: usize = 5;

pub struct HttpEngine {
    client: reqwest::Client,
}

impl Default for HttpEngine {
    fn default() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(TOTAL_TIMEOUT)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .expect("reqwest client configuration is static and valid");
        Self { client }
    }
}

impl HttpEngine {
    pub async fn execute(
        &self,
        def: &HttpToolDef,
        backend: &dyn Backend,
        ctx: &InvocationContext,
    ) -> Result<CallToolResult, VmcpError> {
        let method_str = TemplateEngine::render(&def.method, backend, ctx).await?;
        let url = TemplateEngine::render(&def.url_template, backend, ctx).await?;
        let method = method_str
            .trim()
            .parse::<reqwest::Method>()
            .map_err(|e| VmcpError::ToolBadOutput { tool: def.name.clone(), detail: format!("invalid HTTP method {method_str:?}: {e}") })?;

        let mut request = self.client.request(method, &url);
        for (key, value_template) in &def.header_templates {
            let value = TemplateEngine::render(value_template, backend, ctx).await?;
            request = request.header(key, value);
        }
        for (key, value) in self.auth_headers(&def.auth) {
            request = request.header(key, value);
        }

        if let Some(body_template) = &def.body_template {
            let body = TemplateEngine::render(body_template, backend, ctx).await?;
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VmcpError::ToolCrash { tool: def.name.clone(), detail: format!("HTTP request failed: {e}") })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VmcpError::ToolHttpStatus {
                tool: def.name.clone(),
                status: status.as_u16(),
                body_excerpt: body.chars().take(500).collect(),
            });
        }

        self.render_response(def, response).await
    }

    fn auth_headers(&self, binding: &HttpAuthBinding) -> Vec<(String, String)> {
        match binding {
            HttpAuthBinding::None => Vec::new(),
            HttpAuthBinding::Policy(policy) => policy.static_headers(),
            HttpAuthBinding::Upstream { extra_headers } => extra_headers.clone(),
        }
    }

    async fn render_response(&self, def: &HttpToolDef, response: reqwest::Response) -> Result<CallToolResult, VmcpError> {
        let content = match def.response_kind {
            ResponseKind::Text => {
                let text = response
                    .text()
                    .await
                    .map_err(|e| VmcpError::ToolBadOutput { tool: def.name.clone(), detail: format!("failed to read response text: {e}") })?;
                vec![ContentPart::Text { text }]
            }
            ResponseKind::Json => {
                let value: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| VmcpError::ToolBadOutput { tool: def.name.clone(), detail: format!("response was not valid JSON: {e}") })?;
                vec![ContentPart::Text { text: vmcp_template::render_value(&value) }]
            }
            ResponseKind::Binary => {
                let mime_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| VmcpError::ToolBadOutput { tool: def.name.clone(), detail: format!("failed to read response bytes: {e}") })?;
                let data_base64 = base64::engine::general_purpose::STANDARD.encode(bytes);
                vec![ContentPart::Binary { mime_type, data_base64 }]
            }
        };
        Ok(CallToolResult { content, is_error: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use vmcp_core::{EnvMap, VmcpId};
    use vmcp_protocol::types::{GetPromptResult, ReadResourceResult};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct ParamBackend(Value);

    #[async_trait]
    impl Backend for ParamBackend {
        fn param(&self, name: &str) -> Option<Value> {
            self.0.get(name).cloned()
        }
        fn config(&self, _name: &str) -> Option<String> {
            None
        }
        fn mustache_params(&self) -> Value {
            self.0.clone()
        }
        fn resource_alias(&self, _alias: &str) -> Option<String> {
            None
        }
        async fn call_tool(&self, name: &str, _args: Value, _ctx: &InvocationContext) -> Result<CallToolResult, VmcpError> {
            Err(VmcpError::UnknownTool(name.to_string()))
        }
        async fn read_resource(&self, uri: &str, _ctx: &InvocationContext) -> Result<ReadResourceResult, VmcpError> {
            Err(VmcpError::UnknownResource(uri.to_string()))
        }
        async fn render_prompt(&self, name: &str, _args: Value, _ctx: &InvocationContext) -> Result<GetPromptResult, VmcpError> {
            Err(VmcpError::UnknownPrompt(name.to_string()))
        }
    }

    fn ctx() -> InvocationContext {
        InvocationContext::new(VmcpId::new("v1"), EnvMap::default(), Duration::from_secs(30), 8)
    }

    #[tokio::test]
    async fn renders_templated_url_and_returns_text_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hello"))
            .and(query_param("n", "Alice"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hi Alice"))
            .mount(&server)
            .await;

        let def = HttpToolDef {
            name: "greet".to_string(),
            description: None,
            input_schema: json!({}),
            method: "GET".to_string(),
            url_template: format!("{}/hello?n=@param.name", server.uri()),
            header_templates: Vec::new(),
            body_template: None,
            auth: HttpAuthBinding::None,
            response_kind: ResponseKind::Text,
        };
        let backend = ParamBackend(json!({"name": "Alice"}));
        let engine = HttpEngine::default();
        let result = engine.execute(&def, &backend, &ctx()).await.unwrap();
        match &result.content[0] {
            ContentPart::Text { text } => assert_eq!(text, "hi Alice"),
            _ => panic!("expected text part"),
        }
    }

    #[tokio::test]
    async fn non_2xx_surfaces_as_tool_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/boom"))
            .respond_with(ResponseTemplate::new(500).set_body_string("kaboom"))
            .mount(&server)
            .await;

        let def = HttpToolDef {
            name: "boom".to_string(),
            description: None,
            input_schema: json!({}),
            method: "GET".to_string(),
            url_template: format!("{}/boom", server.uri()),
            header_templates: Vec::new(),
            body_template: None,
            auth: HttpAuthBinding::None,
            response_kind: ResponseKind::Text,
        };
        let backend = ParamBackend(json!({}));
        let engine = HttpEngine::default();
        let err = engine.execute(&def, &backend, &ctx()).await.unwrap_err();
        match err {
            VmcpError::ToolHttpStatus { status, .. } => assert_eq!(status, 500),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
