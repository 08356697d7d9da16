//! In-process store of `Vmcp` values (spec §6 persisted state layout,
//! `vmcp` table) and the upstream server configs registered against it.
//! Nothing here talks to `DATABASE_URL` directly — persistence is an
//! external collaborator's job, mirrored here by an in-memory `DashMap`
//! so the Adapter has somewhere to look a vMCP up by name for path
//! routing without reaching into the Composer for that.

use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use vmcp_composer::Vmcp;
use vmcp_core::VmcpId;

fn now_epoch_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// One `vmcp` row (spec §6): the Composer's `Vmcp` plus the metadata the
/// REST control surface manages but the Composer itself never reads.
#[derive(Debug, Clone)]
pub struct VmcpRecord {
    pub vmcp: Vmcp,
    pub is_public: bool,
    pub tags: Vec<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Default)]
pub struct VmcpStore {
    by_id: DashMap<VmcpId, VmcpRecord>,
    name_index: DashMap<String, VmcpId>,
}

impl VmcpStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, vmcp: Vmcp) -> VmcpRecord {
        let now = now_epoch_ms();
        let record = VmcpRecord {
            is_public: false,
            tags: Vec::new(),
            created_at_ms: now,
            updated_at_ms: now,
            vmcp,
        };
        self.name_index.insert(record.vmcp.name.clone(), record.vmcp.id.clone());
        self.by_id.insert(record.vmcp.id.clone(), record.clone());
        record
    }

    pub fn get(&self, id: &VmcpId) -> Option<VmcpRecord> {
        self.by_id.get(id).map(|e| e.clone())
    }

    pub fn get_by_name(&self, name: &str) -> Option<VmcpRecord> {
        let id = self.name_index.get(name)?.clone();
        self.get(&id)
    }

    pub fn update(&self, id: &VmcpId, f: impl FnOnce(&mut Vmcp)) -> Option<VmcpRecord> {
        let mut entry = self.by_id.get_mut(id)?;
        let old_name = entry.vmcp.name.clone();
        f(&mut entry.vmcp);
        entry.updated_at_ms = now_epoch_ms();
        if entry.vmcp.name != old_name {
            self.name_index.remove(&old_name);
            self.name_index.insert(entry.vmcp.name.clone(), id.clone());
        }
        Some(entry.clone())
    }

    pub fn set_sharing(&self, id: &VmcpId, is_public: bool, tags: Vec<String>) -> Option<VmcpRecord> {
        let mut entry = self.by_id.get_mut(id)?;
        entry.is_public = is_public;
        entry.tags = tags;
        entry.updated_at_ms = now_epoch_ms();
        Some(entry.clone())
    }

    pub fn remove(&self, id: &VmcpId) -> Option<VmcpRecord> {
        let record = self.by_id.remove(id).map(|(_, r)| r)?;
        self.name_index.remove(&record.vmcp.name);
        Some(record)
    }

    pub fn list(&self) -> Vec<VmcpRecord> {
        self.by_id.iter().map(|e| e.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

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

    #[test]
    fn insert_and_look_up_by_name() {
        let store = VmcpStore::new();
        store.insert(vmcp("demo"));
        assert!(store.get_by_name("demo").is_some());
        assert!(store.get_by_name("missing").is_none());
    }

    #[test]
    fn rename_updates_the_name_index() {
        let store = VmcpStore::new();
        let record = store.insert(vmcp("demo"));
        store.update(&record.vmcp.id, |v| v.name = "renamed".to_string());
        assert!(store.get_by_name("demo").is_none());
        assert!(store.get_by_name("renamed").is_some());
    }

    #[test]
    fn remove_drops_both_indices() {
        let store = VmcpStore::new();
        let record = store.insert(vmcp("demo"));
        store.remove(&record.vmcp.id);
        assert!(store.get_by_name("demo").is_none());
        assert!(store.get(&record.vmcp.id).is_none());
    }
}
