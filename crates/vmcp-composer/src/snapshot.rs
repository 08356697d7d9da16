//! Builds one vMCP's merged capability view (spec §4.6): upstreams in
//! declared order (skipping any not `connected`), then custom
//! definitions, collision-resolved into exposed names, with the reverse
//! map `dispatch.rs` uses to route a call back to its owner.

use std::collections::HashMap;

use vmcp_core::{InvocationContext, ServerId, VmcpError};
use vmcp_protocol::types::{
    PromptDescriptor, ResourceDescriptor, ResourceTemplateDescriptor, ToolDescriptor,
};
use vmcp_tools::describe;
use vmcp_upstream::{SessionState, UpstreamOperations, UpstreamRegistry};

use crate::merge::{resolve, Candidate};
use crate::types::{Origin, ReverseEntry, Vmcp};

/// One vMCP's merged, name-resolved view as of one build. Rebuilt whenever
/// `list_tools`/`list_resources`/`list_prompts` is called — deliberately
/// simpler than a long-lived bidirectional id map with eviction, since the
/// only lookup direction dispatch needs is `exposed_name -> owner`.
pub struct Snapshot {
    pub tools: Vec<ToolDescriptor>,
    pub resources: Vec<ResourceDescriptor>,
    pub resource_templates: Vec<ResourceTemplateDescriptor>,
    pub prompts: Vec<PromptDescriptor>,
    tool_owners: HashMap<String, ReverseEntry>,
    resource_owners: HashMap<String, ReverseEntry>,
    prompt_owners: HashMap<String, ReverseEntry>,
}

impl Snapshot {
    pub fn tool_owner(&self, exposed_name: &str) -> Option<&ReverseEntry> {
        self.tool_owners.get(exposed_name)
    }

    pub fn resource_owner(&self, exposed_uri: &str) -> Option<&ReverseEntry> {
        self.resource_owners.get(exposed_uri)
    }

    pub fn prompt_owner(&self, exposed_name: &str) -> Option<&ReverseEntry> {
        self.prompt_owners.get(exposed_name)
    }
}

fn server_label(id: &ServerId) -> String {
    id.as_str().to_string()
}

/// Upstreams not in `Connected` state are skipped entirely from `list_*`
/// output (spec §4.6 "upstreams not in `connected`").
async fn connected_upstreams<'a>(
    vmcp: &'a Vmcp,
    registry: &'a UpstreamRegistry,
) -> Vec<(&'a ServerId, UpstreamOperations<'a>)> {
    let mut out = Vec::new();
    for id in &vmcp.upstream_refs {
        if registry.status_of(id).await == Some(SessionState::Connected) {
            out.push((id, UpstreamOperations::new(registry, id.clone())));
        }
    }
    out
}

pub async fn build(
    vmcp: &Vmcp,
    registry: &UpstreamRegistry,
    ctx: &InvocationContext,
    now_epoch_ms: i64,
) -> Result<Snapshot, VmcpError> {
    let upstreams = connected_upstreams(vmcp, registry).await;

    let mut tool_candidates = Vec::new();
    let mut resource_candidates = Vec::new();
    let mut prompts_candidates = Vec::new();
    let mut resource_templates = Vec::new();

    for (id, ops) in &upstreams {
        for tool in ops.list_tools(ctx, now_epoch_ms).await? {
            tool_candidates.push(Candidate {
                bare_name: tool.name.clone(),
                local_name: tool.name.clone(),
                origin: Origin::Upstream((*id).clone()),
                descriptor: tool,
            });
        }
        for resource in ops.list_resources(ctx, now_epoch_ms).await? {
            resource_candidates.push(Candidate {
                bare_name: resource.uri.clone(),
                local_name: resource.uri.clone(),
                origin: Origin::Upstream((*id).clone()),
                descriptor: resource,
            });
        }
        for prompt in ops.list_prompts(ctx, now_epoch_ms).await? {
            prompts_candidates.push(Candidate {
                bare_name: prompt.name.clone(),
                local_name: prompt.name.clone(),
                origin: Origin::Upstream((*id).clone()),
                descriptor: prompt,
            });
        }
        resource_templates.extend(ops.list_resource_templates(ctx, now_epoch_ms).await?);
    }

    for custom in &vmcp.custom_tools {
        let descriptor = describe(custom);
        tool_candidates.push(Candidate {
            bare_name: descriptor.name.clone(),
            local_name: descriptor.name.clone(),
            origin: Origin::Custom,
            descriptor,
        });
    }
    for resource in &vmcp.custom_resources {
        let descriptor = ResourceDescriptor {
            uri: resource.uri.clone(),
            name: resource.name.clone(),
            mime_type: resource.mime_type.clone(),
        };
        resource_candidates.push(Candidate {
            bare_name: descriptor.uri.clone(),
            local_name: descriptor.uri.clone(),
            origin: Origin::Custom,
            descriptor,
        });
    }
    for prompt in &vmcp.custom_prompts {
        let descriptor = PromptDescriptor {
            name: prompt.name.clone(),
            description: prompt.description.clone(),
            input_schema: prompt.input_schema.clone(),
        };
        prompts_candidates.push(Candidate {
            bare_name: descriptor.name.clone(),
            local_name: descriptor.name.clone(),
            origin: Origin::Custom,
            descriptor,
        });
    }

    let resolved_tools = resolve(tool_candidates, server_label);
    let resolved_resources = resolve(resource_candidates, server_label);
    let resolved_prompts = resolve(prompts_candidates, server_label);

    let mut tool_owners = HashMap::new();
    let tools = resolved_tools
        .into_iter()
        .map(|r| {
            tool_owners.insert(r.exposed_name.clone(), ReverseEntry { origin: r.origin, local_name: r.local_name });
            ToolDescriptor { name: r.exposed_name, ..r.descriptor }
        })
        .collect();

    let mut resource_owners = HashMap::new();
    let resources = resolved_resources
        .into_iter()
        .map(|r| {
            resource_owners.insert(r.exposed_name.clone(), ReverseEntry { origin: r.origin, local_name: r.local_name });
            ResourceDescriptor { uri: r.exposed_name, ..r.descriptor }
        })
        .collect();

    let mut prompt_owners = HashMap::new();
    let prompts = resolved_prompts
        .into_iter()
        .map(|r| {
            prompt_owners.insert(r.exposed_name.clone(), ReverseEntry { origin: r.origin, local_name: r.local_name });
            PromptDescriptor { name: r.exposed_name, ..r.descriptor }
        })
        .collect();

    Ok(Snapshot {
        tools,
        resources,
        resource_templates,
        prompts,
        tool_owners,
        resource_owners,
        prompt_owners,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap as StdHashMap;
    use vmcp_core::{EnvMap, VmcpId};
    use vmcp_tools::{CustomToolDef, PromptToolDef, ScriptToolDef};

    fn empty_vmcp() -> Vmcp {
        Vmcp {
            id: VmcpId::new("v1"),
            name: "demo".to_string(),
            description: None,
            upstream_refs: Vec::new(),
            custom_tools: Vec::new(),
            custom_resources: Vec::new(),
            custom_prompts: Vec::new(),
            system_prompt: String::new(),
            env: StdHashMap::new(),
        }
    }

    fn ctx() -> InvocationContext {
        InvocationContext::new(VmcpId::new("v1"), EnvMap::default(), std::time::Duration::from_secs(30), 8)
    }

    #[tokio::test]
    async fn no_upstreams_and_no_customs_is_an_empty_snapshot() {
        let vmcp = empty_vmcp();
        let registry = UpstreamRegistry::new();
        let snapshot = build(&vmcp, &registry, &ctx(), 0).await.unwrap();
        assert!(snapshot.tools.is_empty());
        assert!(snapshot.resources.is_empty());
        assert!(snapshot.prompts.is_empty());
    }

    #[tokio::test]
    async fn custom_tool_is_exposed_under_its_bare_name() {
        let mut vmcp = empty_vmcp();
        vmcp.custom_tools.push(CustomToolDef::Script(ScriptToolDef {
            name: "echo".to_string(),
            description: None,
            input_schema: json!({}),
            source: "print('{}')".to_string(),
            env_reads: Vec::new(),
        }));
        let registry = UpstreamRegistry::new();
        let snapshot = build(&vmcp, &registry, &ctx(), 0).await.unwrap();
        assert_eq!(snapshot.tools.len(), 1);
        assert_eq!(snapshot.tools[0].name, "echo");
        let owner = snapshot.tool_owner("echo").unwrap();
        assert_eq!(owner.origin, Origin::Custom);
        assert_eq!(owner.local_name, "echo");
    }

    #[tokio::test]
    async fn custom_prompt_is_exposed_under_its_bare_name() {
        let mut vmcp = empty_vmcp();
        vmcp.custom_prompts.push(PromptToolDef {
            name: "brief".to_string(),
            description: None,
            input_schema: json!({}),
            body_template: "hi".to_string(),
        });
        let registry = UpstreamRegistry::new();
        let snapshot = build(&vmcp, &registry, &ctx(), 0).await.unwrap();
        assert_eq!(snapshot.prompts.len(), 1);
        assert!(snapshot.prompt_owner("brief").is_some());
    }
}
