//! The vMCP data model (spec §3 "vMCP") and the origin bookkeeping the
//! Composer needs to route a dispatched call back to whoever owns it.

use std::collections::HashMap;

use vmcp_core::{EnvValue, ServerId, VmcpId};
use vmcp_protocol::types::Arguments;
use vmcp_tools::{CustomToolDef, PromptToolDef};

#[derive(Debug, Clone)]
pub enum ResourceContent {
    Literal(Vec<u8>),
    Blob { blob_id: String },
}

#[derive(Debug, Clone)]
pub struct CustomResource {
    pub uri: String,
    pub name: String,
    pub mime_type: Option<String>,
    pub content: ResourceContent,
}

/// Who actually owns an exposed capability once the reverse map resolves it
/// (spec §4.6 "a stable reverse map `exposed_name -> (origin, local_name)`").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    Custom,
    Upstream(ServerId),
}

#[derive(Debug, Clone)]
pub struct ReverseEntry {
    pub origin: Origin,
    pub local_name: String,
}

/// One vMCP (spec §3). Upstream references and custom definitions keep
/// their declared order — `list_tools`/`list_resources`/`list_prompts`
/// iterate in this order before collision resolution runs (spec §4.6).
#[derive(Debug, Clone)]
pub struct Vmcp {
    pub id: VmcpId,
    pub name: String,
    pub description: Option<String>,
    pub upstream_refs: Vec<ServerId>,
    pub custom_tools: Vec<CustomToolDef>,
    pub custom_resources: Vec<CustomResource>,
    pub custom_prompts: Vec<PromptToolDef>,
    pub system_prompt: String,
    pub env: HashMap<String, EnvValue>,
}

impl Vmcp {
    /// Deep-clones this vMCP with a fresh id (spec §6 REST surface "fork";
    /// a pure value operation, no network surface of its own — SPEC_FULL §2).
    pub fn fork(&self, new_id: VmcpId, new_name: String) -> Self {
        Self {
            id: new_id,
            name: new_name,
            description: self.description.clone(),
            upstream_refs: self.upstream_refs.clone(),
            custom_tools: self.custom_tools.clone(),
            custom_resources: self.custom_resources.clone(),
            custom_prompts: self.custom_prompts.clone(),
            system_prompt: self.system_prompt.clone(),
            env: self.env.clone(),
        }
    }
}

/// Request-supplied argument overrides, layered onto the vMCP's environment
/// defaults before freezing into an `InvocationContext` (spec §4.6
/// "Environment binding").
pub type EnvOverrides = HashMap<String, String>;

/// Convenience alias; the Composer passes tool/prompt arguments around as
/// raw JSON objects, matching `vmcp-protocol`'s wire shape.
pub type ToolArguments = Arguments;
