//! The composer-facing facade over one upstream: `list_*` reads go through
//! the Capability Cache, everything else goes straight to the session
//! (spec §4.3 "The Composer asks the cache, not the session, for `list_*`
//! results").

use std::sync::Arc;

use serde_json::Value;
use vmcp_core::{InvocationContext, ServerId, VmcpError};
use vmcp_protocol::types::{
    CallToolResult, GetPromptResult, PromptDescriptor, ReadResourceResult, ResourceDescriptor,
    ResourceTemplateDescriptor, ToolDescriptor,
};

use crate::registry::UpstreamRegistry;

/// One upstream's operations, bound to a specific server id within a
/// registry. Cheap to construct — it holds no state of its own.
pub struct UpstreamOperations<'a> {
    registry: &'a UpstreamRegistry,
    id: ServerId,
}

impl<'a> UpstreamOperations<'a> {
    pub fn new(registry: &'a UpstreamRegistry, id: ServerId) -> Self {
        Self { registry, id }
    }

    async fn ensure_fresh(&self, ctx: &InvocationContext, now_epoch_ms: i64) -> Result<(), VmcpError> {
        self.registry.ensure_discovered(&self.id, ctx, now_epoch_ms).await
    }

    pub async fn list_tools(
        &self,
        ctx: &InvocationContext,
        now_epoch_ms: i64,
    ) -> Result<Vec<ToolDescriptor>, VmcpError> {
        self.ensure_fresh(ctx, now_epoch_ms).await?;
        let cache = self
            .registry
            .cache_of(&self.id)
            .ok_or_else(|| VmcpError::UpstreamUnavailable { server: self.id.to_string() })?;
        Ok(cache.get().tools.clone())
    }

    pub async fn list_resources(
        &self,
        ctx: &InvocationContext,
        now_epoch_ms: i64,
    ) -> Result<Vec<ResourceDescriptor>, VmcpError> {
        self.ensure_fresh(ctx, now_epoch_ms).await?;
        let cache = self
            .registry
            .cache_of(&self.id)
            .ok_or_else(|| VmcpError::UpstreamUnavailable { server: self.id.to_string() })?;
        Ok(cache.get().resources.clone())
    }

    pub async fn list_resource_templates(
        &self,
        ctx: &InvocationContext,
        now_epoch_ms: i64,
    ) -> Result<Vec<ResourceTemplateDescriptor>, VmcpError> {
        self.ensure_fresh(ctx, now_epoch_ms).await?;
        let cache = self
            .registry
            .cache_of(&self.id)
            .ok_or_else(|| VmcpError::UpstreamUnavailable { server: self.id.to_string() })?;
        Ok(cache.get().resource_templates.clone())
    }

    pub async fn list_prompts(
        &self,
        ctx: &InvocationContext,
        now_epoch_ms: i64,
    ) -> Result<Vec<PromptDescriptor>, VmcpError> {
        self.ensure_fresh(ctx, now_epoch_ms).await?;
        let cache = self
            .registry
            .cache_of(&self.id)
            .ok_or_else(|| VmcpError::UpstreamUnavailable { server: self.id.to_string() })?;
        Ok(cache.get().prompts.clone())
    }

    fn session(&self) -> Result<Arc<crate::session::UpstreamSession>, VmcpError> {
        self.registry
            .session_of(&self.id)
            .ok_or_else(|| VmcpError::UpstreamUnavailable { server: self.id.to_string() })
    }

    pub async fn call_tool(
        &self,
        name: &str,
        args: Value,
        ctx: &InvocationContext,
    ) -> Result<CallToolResult, VmcpError> {
        self.session()?.call_tool(name, args, ctx).await
    }

    pub async fn read_resource(
        &self,
        uri: &str,
        ctx: &InvocationContext,
    ) -> Result<ReadResourceResult, VmcpError> {
        self.session()?.read_resource(uri, ctx).await
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        args: Value,
        ctx: &InvocationContext,
    ) -> Result<GetPromptResult, VmcpError> {
        self.session()?.get_prompt(name, args, ctx).await
    }

    pub async fn ping(&self, ctx: &InvocationContext) -> Result<(), VmcpError> {
        self.session()?.ping(ctx).await
    }
}
