//! Shared state behind the axum router (spec §4.7): the Composer, the
//! vMCP store the Adapter routes by name, and one SSE broadcast channel
//! per vMCP for the streamable transport (spec §6 "streamable" prefix).

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use vmcp_composer::Composer;
use vmcp_core::VmcpId;

use crate::admin::AdminApi;
use crate::config::VmcpServerConfig;
use crate::store::VmcpStore;

const SSE_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub composer: Arc<Composer>,
    pub store: Arc<VmcpStore>,
    pub admin: Arc<AdminApi>,
    pub config: Arc<VmcpServerConfig>,
    sse_channels: Arc<DashMap<VmcpId, broadcast::Sender<String>>>,
}

impl AppState {
    pub fn new(composer: Arc<Composer>, store: Arc<VmcpStore>, admin: Arc<AdminApi>, config: Arc<VmcpServerConfig>) -> Self {
        Self {
            composer,
            store,
            admin,
            config,
            sse_channels: Arc::new(DashMap::new()),
        }
    }

    /// Broadcasts a rendered JSON-RPC message onto `vmcp_id`'s SSE channel,
    /// creating the channel lazily if no subscriber has connected yet.
    pub fn broadcast(&self, vmcp_id: &VmcpId, message: String) {
        let sender = self
            .sse_channels
            .entry(vmcp_id.clone())
            .or_insert_with(|| broadcast::channel(SSE_CHANNEL_CAPACITY).0)
            .clone();
        let _ = sender.send(message);
    }

    pub fn subscribe(&self, vmcp_id: &VmcpId) -> broadcast::Receiver<String> {
        self.sse_channels
            .entry(vmcp_id.clone())
            .or_insert_with(|| broadcast::channel(SSE_CHANNEL_CAPACITY).0)
            .subscribe()
    }
}
