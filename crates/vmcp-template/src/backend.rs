//! The seam between the template engine and whoever actually owns tools,
//! resources, and prompts (the composer, in the full aggregator). Kept
//! abstract here so this crate has no dependency on `vmcp-composer` (spec
//! §4.4 is defined independently of §4.6).

use async_trait::async_trait;
use serde_json::Value;

use vmcp_core::{InvocationContext, VmcpError};
use vmcp_protocol::types::{CallToolResult, GetPromptResult, ReadResourceResult};

/// Supplies the values an `@`-expression resolves against and performs the
/// actual nested tool/resource/prompt calls.
#[async_trait]
pub trait Backend: Send + Sync {
    /// The named argument passed to the current tool/prompt invocation
    /// (spec §4.4 `@param.NAME`).
    fn param(&self, name: &str) -> Option<Value>;

    /// The named vMCP environment variable (spec §4.4 `@config.NAME`).
    fn config(&self, name: &str) -> Option<String>;

    /// The full argument object the `{{var}}`/`{{#if}}`/`{{#each}}` text
    /// layer resolves against (spec §4.4(b) runs over "the parameter
    /// namespace" as a whole, not one name at a time like `@param.NAME`).
    fn mustache_params(&self) -> Value;

    /// Resolves an `@resource.alias` to the URI it stands for. Returns
    /// `None` if no such alias is configured.
    fn resource_alias(&self, alias: &str) -> Option<String>;

    async fn call_tool(
        &self,
        name: &str,
        args: Value,
        ctx: &InvocationContext,
    ) -> Result<CallToolResult, VmcpError>;

    async fn read_resource(&self, uri: &str, ctx: &InvocationContext) -> Result<ReadResourceResult, VmcpError>;

    async fn render_prompt(
        &self,
        name: &str,
        args: Value,
        ctx: &InvocationContext,
    ) -> Result<GetPromptResult, VmcpError>;
}
