//! Per-upstream Capability Cache (spec §4.3). The composer reads snapshots
//! from here, never from the session directly, so `list_*` sees a
//! consistent point-in-time view even while a refresh is in flight.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use vmcp_core::VmcpError;
use vmcp_protocol::types::CapabilitySnapshot;

use crate::session::UpstreamSession;

/// Holds the most recent [`CapabilitySnapshot`] for one upstream plus the
/// bookkeeping the composer needs to decide whether to trust it.
pub struct CapabilityCache {
    snapshot: ArcSwap<CapabilitySnapshot>,
    discovered_at_epoch_ms: AtomicI64,
    stale: AtomicBool,
}

impl Default for CapabilityCache {
    fn default() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(CapabilitySnapshot::default()),
            discovered_at_epoch_ms: AtomicI64::new(0),
            stale: AtomicBool::new(true),
        }
    }
}

impl CapabilityCache {
    /// Lock-free read of the current snapshot (spec §4.3 "Reads are
    /// lock-free snapshot reads").
    pub fn get(&self) -> Arc<CapabilitySnapshot> {
        self.snapshot.load_full()
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    pub fn discovered_at_epoch_ms(&self) -> i64 {
        self.discovered_at_epoch_ms.load(Ordering::Acquire)
    }

    /// Atomically swaps in a freshly discovered snapshot (spec §4.3
    /// "writes swap the snapshot pointer under a short lock" — `ArcSwap`
    /// gives us the pointer swap without a held lock at all).
    fn replace(&self, snapshot: CapabilitySnapshot, now_epoch_ms: i64) {
        self.snapshot.store(Arc::new(snapshot));
        self.discovered_at_epoch_ms.store(now_epoch_ms, Ordering::Release);
        self.stale.store(false, Ordering::Release);
    }

    /// Drops the snapshot back to empty and marks it stale (spec §4.3
    /// `clear_cache`).
    pub fn clear(&self) {
        self.snapshot.store(Arc::new(CapabilitySnapshot::default()));
        self.stale.store(true, Ordering::Release);
    }

    /// Synchronous (relative to the caller) discovery against the live
    /// session, used both for "first access after connect" and explicit
    /// `refresh()` (spec §4.3).
    pub async fn discover(
        &self,
        session: &UpstreamSession,
        ctx: &vmcp_core::InvocationContext,
        now_epoch_ms: i64,
    ) -> Result<(), VmcpError> {
        let discovered = session.discover_all(ctx).await?;
        self.replace(
            CapabilitySnapshot {
                tools: discovered.tools,
                resources: discovered.resources,
                resource_templates: discovered.resource_templates,
                prompts: discovered.prompts,
            },
            now_epoch_ms,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmcp_protocol::types::ToolDescriptor;
    use serde_json::json;

    #[test]
    fn default_cache_is_empty_and_stale() {
        let cache = CapabilityCache::default();
        assert!(cache.is_stale());
        assert!(cache.get().tools.is_empty());
    }

    #[test]
    fn replace_clears_staleness_and_updates_timestamp() {
        let cache = CapabilityCache::default();
        cache.replace(
            CapabilitySnapshot {
                tools: vec![ToolDescriptor {
                    name: "search".to_string(),
                    description: None,
                    input_schema: json!({}),
                }],
                resources: Vec::new(),
                resource_templates: Vec::new(),
                prompts: Vec::new(),
            },
            1000,
        );
        assert!(!cache.is_stale());
        assert_eq!(cache.discovered_at_epoch_ms(), 1000);
        assert_eq!(cache.get().tools.len(), 1);
    }

    #[test]
    fn clear_drops_snapshot_and_marks_stale() {
        let cache = CapabilityCache::default();
        cache.replace(
            CapabilitySnapshot {
                tools: vec![ToolDescriptor {
                    name: "search".to_string(),
                    description: None,
                    input_schema: json!({}),
                }],
                ..Default::default()
            },
            1000,
        );
        cache.clear();
        assert!(cache.is_stale());
        assert!(cache.get().tools.is_empty());
    }
}
