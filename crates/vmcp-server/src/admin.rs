//! The control-surface API (spec §6 "REST control surface"): register/
//! remove upstream; create/update/delete vMCP; connect/disconnect/
//! clear-auth/clear-cache of an upstream; refresh capabilities; save
//! environment variables; share/fork vMCP. Spec is explicit that this is
//! language-level, not HTTP — an external REST layer wraps it. `AdminApi`
//! is that language-level surface.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use vmcp_composer::Vmcp;
use vmcp_core::{EnvMap, EnvValue, InvocationContext, ServerId, VmcpError, VmcpId};
use vmcp_upstream::{UpstreamRegistry, UpstreamServerConfig};

use crate::store::{VmcpRecord, VmcpStore};

fn now_epoch_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

pub struct AdminApi {
    registry: Arc<UpstreamRegistry>,
    store: Arc<VmcpStore>,
}

impl AdminApi {
    pub fn new(registry: Arc<UpstreamRegistry>, store: Arc<VmcpStore>) -> Self {
        Self { registry, store }
    }

    pub async fn register_upstream(&self, config: UpstreamServerConfig) -> Result<ServerId, VmcpError> {
        let id = config.id.clone();
        self.registry.get_or_open(config).await?;
        Ok(id)
    }

    pub async fn remove_upstream(&self, id: &ServerId) {
        self.registry.close(id).await;
    }

    pub fn create_vmcp(&self, vmcp: Vmcp) -> VmcpRecord {
        self.store.insert(vmcp)
    }

    pub fn update_vmcp(&self, id: &VmcpId, f: impl FnOnce(&mut Vmcp)) -> Option<VmcpRecord> {
        self.store.update(id, f)
    }

    pub async fn delete_vmcp(&self, id: &VmcpId) -> Option<VmcpRecord> {
        self.store.remove(id)
    }

    pub async fn connect_upstream(&self, config: UpstreamServerConfig) -> Result<(), VmcpError> {
        self.registry.get_or_open(config).await?;
        Ok(())
    }

    pub async fn disconnect_upstream(&self, id: &ServerId) {
        self.registry.close(id).await;
    }

    pub async fn clear_auth(&self, id: &ServerId) -> Result<(), VmcpError> {
        let session = self
            .registry
            .session_of(id)
            .ok_or_else(|| VmcpError::UpstreamUnavailable { server: id.to_string() })?;
        session.clear_auth().await;
        Ok(())
    }

    pub fn clear_cache(&self, id: &ServerId) {
        self.registry.clear_cache(id);
    }

    pub async fn refresh_capabilities(&self, id: &ServerId) -> Result<(), VmcpError> {
        let ctx = InvocationContext::new(
            VmcpId::new("admin"),
            EnvMap::default(),
            std::time::Duration::from_secs(30),
            0,
        );
        self.registry.refresh(id, &ctx, now_epoch_ms()).await
    }

    pub fn save_env(&self, id: &VmcpId, vars: HashMap<String, EnvValue>) -> Option<VmcpRecord> {
        self.store.update(id, |v| v.env = vars)
    }

    /// `Vmcp::fork` is the pure value operation the REST layer uses to
    /// duplicate a vMCP under a new id/name (SPEC_FULL §2).
    pub fn fork_vmcp(&self, id: &VmcpId, new_id: VmcpId, new_name: String) -> Option<VmcpRecord> {
        let source = self.store.get(id)?;
        Some(self.store.insert(source.vmcp.fork(new_id, new_name)))
    }

    pub fn share_vmcp(&self, id: &VmcpId, is_public: bool, tags: Vec<String>) -> Option<VmcpRecord> {
        self.store.set_sharing(id, is_public, tags)
    }

    pub fn list_vmcps(&self) -> Vec<VmcpRecord> {
        self.store.list()
    }

    pub fn get_vmcp(&self, id: &VmcpId) -> Option<VmcpRecord> {
        self.store.get(id)
    }

    pub fn get_vmcp_by_name(&self, name: &str) -> Option<VmcpRecord> {
        self.store.get_by_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vmcp(name: &str) -> Vmcp {
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

    fn admin() -> AdminApi {
        AdminApi::new(Arc::new(UpstreamRegistry::new()), Arc::new(VmcpStore::new()))
    }

    #[test]
    fn create_then_fork_yields_a_distinct_copy() {
        let admin = admin();
        let original = admin.create_vmcp(vmcp("demo"));
        let forked = admin.fork_vmcp(&original.vmcp.id, VmcpId::new("demo-copy"), "demo (copy)".to_string()).unwrap();
        assert_ne!(forked.vmcp.id, original.vmcp.id);
        assert_eq!(forked.vmcp.name, "demo (copy)");
        assert_eq!(admin.list_vmcps().len(), 2);
    }

    #[test]
    fn share_vmcp_flips_visibility_and_tags() {
        let admin = admin();
        let record = admin.create_vmcp(vmcp("demo"));
        assert!(!record.is_public);
        let shared = admin.share_vmcp(&record.vmcp.id, true, vec!["team".to_string()]).unwrap();
        assert!(shared.is_public);
        assert_eq!(shared.tags, vec!["team".to_string()]);
    }

    #[test]
    fn delete_vmcp_removes_it_from_the_store() {
        let admin = admin();
        let record = admin.create_vmcp(vmcp("demo"));
        assert!(admin.get_vmcp(&record.vmcp.id).is_some());
        tokio_test::block_on(admin.delete_vmcp(&record.vmcp.id));
        assert!(admin.get_vmcp(&record.vmcp.id).is_none());
    }
}
